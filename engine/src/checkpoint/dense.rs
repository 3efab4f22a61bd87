use std::{fs, io, path::Path};

use crate::{EngineErr, Result};

pub fn encode_dense(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Reads a dense parameter file.
///
/// # Arguments
/// * `path` - The file to read.
/// * `expected` - The amount of parameters the network has.
///
/// # Returns
/// `None` if the file doesn't exist, `CorruptFile` if its size doesn't match.
pub fn read_dense(path: &Path, expected: usize) -> Result<Option<Vec<f32>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if bytes.len() != expected * 4 {
        return Err(EngineErr::corrupt(
            path,
            format!(
                "holds {} bytes, the network needs {expected} parameters",
                bytes.len()
            ),
        ));
    }

    let values = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Some(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.model");
        let values = [0.1, -0.0, f32::MIN_POSITIVE, 1e30, -7.25];

        fs::write(&path, encode_dense(&values)).unwrap();
        let read = read_dense(&path, values.len()).unwrap().unwrap();

        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&read), bits(&values));
    }

    #[test]
    fn missing_file_is_none_and_wrong_size_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.model");

        assert!(read_dense(&path, 3).unwrap().is_none());

        fs::write(&path, encode_dense(&[1., 2.])).unwrap();
        assert!(matches!(
            read_dense(&path, 3),
            Err(EngineErr::CorruptFile { .. })
        ));
    }
}
