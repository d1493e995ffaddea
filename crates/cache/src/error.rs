use thiserror::Error;

/// Errors that can occur when talking to the cache backend.
///
/// None of these should ever fail a request: callers degrade to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to connect to the backend.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed an operation.
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// The stored value has the wrong shape for the requested operation
    /// (e.g. incrementing a non-integer, set ops on a plain string).
    #[error("wrong value type for key {key}: {message}")]
    WrongType { key: String, message: String },

    /// A serialization/deserialization error occurred.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
