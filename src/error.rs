use thiserror::Error;

/// Crate-wide error taxonomy. One variant per failure mode named in the
/// index's public contract; internal-only failures (`InternalCorruption`,
/// `OutOfBounds`) are never expected to surface from a correct caller.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("label not found: {0}")]
    LabelNotFound(u64),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("out of bounds: slot {slot} >= capacity {capacity}")]
    OutOfBounds { slot: u32, capacity: u32 },

    #[error("format mismatch: expected magic {expected:?}, got {actual:?}")]
    FormatMismatch { expected: [u8; 8], actual: [u8; 8] },

    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("internal corruption detected: {0}")]
    InternalCorruption(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
