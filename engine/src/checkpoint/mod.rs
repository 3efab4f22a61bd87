//! On-disk snapshots of a session's parameters.
//!
//! A snapshot at iteration `iter` is made of:
//!
//! * `{prefix}_dense_{iter}.model`: the dense parameters of one replica as
//!   raw little-endian `f32`, in layer order, without a header.
//! * `{prefix}{table}_sparse_{iter}.model.{part}`: one file per shard of every
//!   embedding table, see [`sparse`] for the layout.
//!
//! Every file is first written under a `.tmp` name and only renamed once all
//! of them are complete.

mod atomic;
mod dense;
pub mod sparse;

use std::path::{Path, PathBuf};

pub use atomic::write_atomically;
pub use dense::{encode_dense, read_dense};
pub use sparse::{encode_part, read_sparse};

pub fn dense_path(prefix: &str, iter: usize) -> PathBuf {
    PathBuf::from(format!("{prefix}_dense_{iter}.model"))
}

/// The path every part of a table's snapshot is derived from.
pub fn sparse_stem(prefix: &str, table: usize, iter: usize) -> PathBuf {
    PathBuf::from(format!("{prefix}{table}_sparse_{iter}.model"))
}

pub fn part_path(stem: &Path, part: usize) -> PathBuf {
    with_suffix(stem, &format!(".{part}"))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
