use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data file not found: {}", .0.display())]
    DataFileMissing(PathBuf),

    #[error("Invalid data in {}: {reason}", path.display())]
    InvalidData { path: PathBuf, reason: String },

    #[error("Partition [{start}, {end}) is outside the index (len {len})")]
    InvalidPartition { start: usize, end: usize, len: usize },

    #[error("Aggregation failed: {0}")]
    AggregationFailed(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
