use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Backend operations for the distributed mutex.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Attempts to store `token` under `key` with the given lease,
    /// succeeding only if the key is absent (or its lease has expired).
    ///
    /// Returns true if the token was stored.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool>;

    /// Deletes `key` only if it still holds `token` (check-and-delete,
    /// atomic in the backend).
    ///
    /// Returns true if the key was deleted, false if the token no longer
    /// matched (the lease expired and someone else holds the lock now).
    async fn release(&self, key: &str, token: &str) -> Result<bool>;
}
