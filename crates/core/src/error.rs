//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("invalid upload status: {0}")]
    InvalidStatus(i64),

    #[error("invalid tombstone status: {0}")]
    InvalidTombstoneStatus(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
