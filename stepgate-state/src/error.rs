//! State error types.

use std::io;
use thiserror::Error;

/// Checkpoint state errors.
#[derive(Error, Debug)]
pub enum StateError {
    /// I/O error while reading or persisting state
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// State document could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// State document was written by an unsupported format version
    #[error("Unsupported state version: {0}")]
    UnsupportedVersion(u32),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
