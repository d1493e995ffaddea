use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// Core trait for cache implementations.
///
/// Values are JSON strings; typed access goes through [`CacheExt`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the value stored under `key`, or `None` on a miss.
    ///
    /// Never blocks on a miss - the caller falls back to the system of
    /// record and repopulates with [`Cache::set`].
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// With a `ttl` the entry expires on its own; without one it lives
    /// until removed.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Removes `key`. Returns true if an entry existed.
    ///
    /// This is the invalidation hook for mutation paths.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Returns true if `key` currently holds a live entry.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically adds `by` to the integer stored under `key`, treating a
    /// missing key as 0. Returns the new value.
    async fn increment(&self, key: &str, by: i64) -> Result<i64>;

    /// Atomically subtracts `by` from the integer stored under `key`,
    /// treating a missing key as 0. Returns the new value.
    async fn decrement(&self, key: &str, by: i64) -> Result<i64>;

    /// Adds `member` to the unordered set under `key`.
    ///
    /// Returns true if the member was newly inserted - consumers use this
    /// for message-id dedupe.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Returns all members of the set under `key` (empty if absent).
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}

/// Extension trait providing typed JSON access on top of [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Gets and deserializes the value under `key`.
    ///
    /// A value that fails to deserialize is reported as an error; callers
    /// treat it like any other cache failure (a miss).
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serializes and stores `value` under `key`.
    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }
}

// Blanket implementation for all Cache implementations
impl<T: Cache + ?Sized> CacheExt for T {}
