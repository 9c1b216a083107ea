//! Coordination store error types.

use thiserror::Error;

/// Coordination store operation errors.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("lock contended: {0}")]
    LockContended(String),

    #[error("lock not held: {0}")]
    LockNotHeld(String),

    #[error("malformed entry at {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Result type for coordination operations.
pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;
