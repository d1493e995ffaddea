use thiserror::Error;

/// Errors that can occur when talking to the lock store.
///
/// A lock that could not be acquired within the wait window is not an
/// error - [`crate::DistributedMutex::acquire`] returns `Ok(None)` for
/// that case and callers surface it as a conflict.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to connect to the backend.
    #[error("lock store connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed an operation.
    #[error("lock store backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
