use thiserror::Error;

/// Errors that can occur when talking to the bus backend.
///
/// Business logic never sees these as request failures - publish sites
/// log and continue, and consumer loops recover locally.
#[derive(Debug, Error)]
pub enum BusError {
    /// Failed to connect to the backend.
    #[error("bus connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed an operation.
    #[error("bus backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A queue already has a consumer attached in this process.
    #[error("queue already consumed: {0}")]
    QueueInUse(String),

    /// A serialization/deserialization error occurred.
    #[error("bus serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
