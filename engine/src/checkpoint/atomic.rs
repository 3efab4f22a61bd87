use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::warn;

use super::with_suffix;
use crate::Result;

/// Writes every `(path, bytes)` pair so that no file is visible half written.
///
/// All the contents go to `.tmp` siblings first, which are flushed to disk.
/// Existing targets are then moved aside to `.bak` siblings and the temporary
/// files renamed over the final names. If any step fails the previous
/// contents are put back, so readers see either the old set or the new one.
pub fn write_atomically(files: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let temps: Vec<_> = files.iter().map(|(path, _)| with_suffix(path, ".tmp")).collect();

    for (temp, (_, bytes)) in temps.iter().zip(files) {
        if let Err(e) = write_synced(temp, bytes) {
            remove_all(&temps);
            return Err(e.into());
        }
    }

    let mut backups = Vec::with_capacity(files.len());
    for (path, _) in files {
        match back_up(path) {
            Ok(backup) => backups.push(backup),
            Err(e) => {
                restore(files, &backups, 0);
                remove_all(&temps);
                return Err(e.into());
            }
        }
    }

    for (i, (temp, (path, _))) in temps.iter().zip(files).enumerate() {
        if let Err(e) = fs::rename(temp, path) {
            restore(files, &backups, i);
            remove_all(&temps);
            return Err(e.into());
        }
    }

    remove_all(backups.iter().flatten());
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

/// Moves the regular file at `path`, if any, to its `.bak` sibling.
fn back_up(path: &Path) -> io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {
            let backup = with_suffix(path, ".bak");
            fs::rename(path, &backup)?;
            Ok(Some(backup))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Puts the previous contents back, the first `renamed` targets already hold
/// the new ones.
fn restore(files: &[(PathBuf, Vec<u8>)], backups: &[Option<PathBuf>], renamed: usize) {
    for (i, ((path, _), backup)) in files.iter().zip(backups).enumerate() {
        let restored = match backup {
            Some(backup) => fs::rename(backup, path),
            None if i < renamed => fs::remove_file(path),
            None => Ok(()),
        };

        if let Err(e) = restored {
            warn!("could not restore {}: {e}", path.display());
        }
    }
}

fn remove_all<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("could not remove {}: {e}", path.display());
        }
    }
}
