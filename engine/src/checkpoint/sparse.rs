//! The sparse snapshot format.
//!
//! Every shard of a table is written to its own part file. A part starts with
//! a fixed header, all integers little-endian:
//!
//! | field      | type      |
//! |------------|-----------|
//! | magic      | `b"CTRS"` |
//! | version    | `u32`     |
//! | key width  | `u32`     |
//! | vec size   | `u32`     |
//! | part       | `u32`     |
//! | part count | `u32`     |
//! | rows       | `u64`     |
//!
//! followed by `rows` records of a key (`key width` bytes) and its `vec size`
//! `f32` values. Parts are independent of how many devices wrote them, a
//! reader merges all of them and re-routes every row to its new owner.

use std::{fs, io, path::Path};

use super::part_path;
use crate::{
    EngineErr, Result,
    embedding::{Key, SparseRows},
};

const MAGIC: &[u8; 4] = b"CTRS";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 5 * 4 + 8;

#[derive(Debug, PartialEq, Eq)]
struct Header {
    key_width: u32,
    vec_size: u32,
    part: u32,
    parts: u32,
    rows: u64,
}

/// Serializes one shard's rows as part `part` out of `parts`.
pub fn encode_part<K: Key>(part: usize, parts: usize, rows: &SparseRows<K>) -> Vec<u8> {
    let vec_size = rows.vec_size();
    let mut out = Vec::with_capacity(HEADER_LEN + rows.len() * (K::WIDTH + 4 * vec_size));

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(K::WIDTH as u32).to_le_bytes());
    out.extend_from_slice(&(vec_size as u32).to_le_bytes());
    out.extend_from_slice(&(part as u32).to_le_bytes());
    out.extend_from_slice(&(parts as u32).to_le_bytes());
    out.extend_from_slice(&(rows.len() as u64).to_le_bytes());

    for (key, values) in rows.iter() {
        out.extend_from_slice(&key.to_bits().to_le_bytes()[..K::WIDTH]);
        for value in values {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    out
}

/// Reads every part of the table snapshot at `stem`.
///
/// # Arguments
/// * `stem` - The path the part files are named after.
/// * `vec_size` - The embedding vector size the table is configured with.
///
/// # Returns
/// The rows of all parts merged, `None` if there is no part 0.
pub fn read_sparse<K: Key>(stem: &Path, vec_size: usize) -> Result<Option<SparseRows<K>>> {
    let first = part_path(stem, 0);
    let bytes = match fs::read(&first) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let parts = PartReader::new(&first, &bytes).header()?.parts as usize;
    if parts == 0 {
        return Err(EngineErr::corrupt(&first, "part count is 0"));
    }
    let mut rows = SparseRows::new(vec_size);

    for part in 0..parts {
        let path = part_path(stem, part);
        let bytes = if part == 0 {
            bytes.clone()
        } else {
            fs::read(&path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    EngineErr::corrupt(&path, format!("part {part} of {parts} is missing"))
                }
                _ => e.into(),
            })?
        };

        let mut part_rows = PartReader::new(&path, &bytes).rows::<K>(part, parts, vec_size)?;
        rows.append(&mut part_rows);
    }

    Ok(Some(rows))
}

struct PartReader<'a> {
    path: &'a Path,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PartReader<'a> {
    fn new(path: &'a Path, bytes: &'a [u8]) -> Self {
        Self {
            path,
            bytes,
            pos: 0,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let Some(chunk) = self.bytes.get(self.pos..end) else {
            return Err(EngineErr::corrupt(self.path, "unexpected end of file"));
        };

        self.pos = end;
        Ok(chunk)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut b = [0; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn header(&mut self) -> Result<Header> {
        if self.take(4)? != MAGIC {
            return Err(EngineErr::corrupt(self.path, "not a sparse snapshot"));
        }

        let version = self.u32()?;
        if version != VERSION {
            return Err(EngineErr::corrupt(
                self.path,
                format!("unsupported version {version}"),
            ));
        }

        Ok(Header {
            key_width: self.u32()?,
            vec_size: self.u32()?,
            part: self.u32()?,
            parts: self.u32()?,
            rows: self.u64()?,
        })
    }

    fn rows<K: Key>(mut self, part: usize, parts: usize, vec_size: usize) -> Result<SparseRows<K>> {
        let header = self.header()?;
        let path = self.path;
        let mismatch = |what: &str, got: u64, expected: usize| {
            EngineErr::corrupt(path, format!("{what} is {got}, expected {expected}"))
        };

        if header.key_width as usize != K::WIDTH {
            return Err(mismatch("key width", header.key_width.into(), K::WIDTH));
        }
        if header.vec_size as usize != vec_size {
            return Err(mismatch("vector size", header.vec_size.into(), vec_size));
        }
        if header.part as usize != part {
            return Err(mismatch("part index", header.part.into(), part));
        }
        if header.parts as usize != parts {
            return Err(mismatch("part count", header.parts.into(), parts));
        }

        let record = K::WIDTH + 4 * vec_size;
        let remaining = self.bytes.len() - self.pos;
        if header.rows.checked_mul(record as u64) != Some(remaining as u64) {
            return Err(EngineErr::corrupt(
                path,
                format!("{remaining} bytes can't hold {} rows", header.rows),
            ));
        }

        let count = header.rows as usize;
        let mut rows = SparseRows::with_capacity(vec_size, count);
        let mut values = vec![0.; vec_size];

        for _ in 0..count {
            let mut bits = [0; 8];
            bits[..K::WIDTH].copy_from_slice(self.take(K::WIDTH)?);
            let key = K::from_bits(u64::from_le_bytes(bits))
                .ok_or_else(|| EngineErr::corrupt(path, "key out of range"))?;

            for (value, b) in values.iter_mut().zip(self.take(4 * vec_size)?.chunks_exact(4)) {
                *value = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            }

            rows.push(key, &values);
        }

        Ok(rows)
    }
}
