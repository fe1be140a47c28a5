//! Error types for schunk
//!
//! Provides a unified error type for all operations. Every public operation
//! validates its inputs before mutating anything, so an `Err` never leaves a
//! store half-updated.

use thiserror::Error;

/// Result type alias using SChunkError
pub type Result<T> = std::result::Result<T, SChunkError>;

/// Unified error type for schunk operations
#[derive(Debug, Error)]
pub enum SChunkError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Chunk index {index} out of range (nchunks = {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Destination too small: need {needed} bytes, got {available}")]
    InsufficientDestination { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for SChunkError {
    fn from(e: bincode::Error) -> Self {
        SChunkError::Serialization(e.to_string())
    }
}
