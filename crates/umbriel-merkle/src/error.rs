//! error types for umbriel-merkle

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("depth must be between 1 and 32, got {0}")]
    DepthOutOfRange(usize),

    #[error("tree is full")]
    TreeFull,

    #[error("index {index} out of range for depth {depth}")]
    IndexOutOfRange { index: u64, depth: usize },

    #[error("index {index} exceeds next index {next_index}, would create a gap")]
    WouldCreateGap { index: u64, next_index: u64 },

    #[error("key already present")]
    KeyExists,

    #[error("key not present")]
    KeyMissing,

    #[error("invalid tree encoding: {0}")]
    InvalidEncoding(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;
