use std::{error::Error, fmt, io, path::PathBuf};

use ndarray::ShapeError;
use rand_distr::{NormalError, uniform::Error as UniformError};

/// The engine's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Every failure the training engine can surface.
#[derive(Debug)]
pub enum EngineErr {
    InvalidArgument(String),
    OutOfMemory {
        device: usize,
        requested: usize,
        available: usize,
    },
    DeviceFault {
        device: usize,
        detail: String,
    },
    Io(io::Error),
    CorruptFile {
        path: PathBuf,
        detail: String,
    },
    NotReady(&'static str),
    NumericOverflow {
        replica: String,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    EndOfData,
}

impl EngineErr {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn size_check(what: &'static str, got: usize, expected: usize) -> Result<()> {
        if got != expected {
            return Err(Self::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::InvalidArgument(detail) => write!(f, "invalid argument: {detail}"),
            EngineErr::OutOfMemory {
                device,
                requested,
                available,
            } => write!(
                f,
                "out of memory on device {device}: requested {requested} bytes, {available} available"
            ),
            EngineErr::DeviceFault { device, detail } => {
                write!(f, "device {device} faulted: {detail}")
            }
            EngineErr::Io(e) => write!(f, "io error: {e}"),
            EngineErr::CorruptFile { path, detail } => {
                write!(f, "corrupt file {}: {detail}", path.display())
            }
            EngineErr::NotReady(what) => write!(f, "not ready: {what}"),
            EngineErr::NumericOverflow { replica } => {
                write!(f, "non-finite gradient found in {replica}")
            }
            EngineErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} length mismatch: got {got}, expected {expected}"),
            EngineErr::EndOfData => write!(f, "the data source is exhausted"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<NormalError> for EngineErr {
    fn from(value: NormalError) -> Self {
        Self::InvalidArgument(format!("normal distribution: {value}"))
    }
}

impl From<UniformError> for EngineErr {
    fn from(value: UniformError) -> Self {
        Self::InvalidArgument(format!("uniform distribution: {value}"))
    }
}

impl From<ShapeError> for EngineErr {
    fn from(value: ShapeError) -> Self {
        Self::InvalidArgument(format!("array shape: {value}"))
    }
}
