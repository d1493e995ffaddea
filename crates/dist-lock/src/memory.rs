use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{LockStore, Result};

struct Held {
    token: String,
    expires_at: Instant,
}

/// In-memory lock store for testing and single-process use.
///
/// Uses the tokio clock for leases so paused-clock tests can drive
/// expiry deterministically.
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    locks: Arc<RwLock<HashMap<String, Held>>>,
}

impl InMemoryLockStore {
    /// Creates a new empty lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of currently held (unexpired) locks.
    pub async fn held_count(&self) -> usize {
        let now = Instant::now();
        self.locks
            .read()
            .await
            .values()
            .filter(|h| h.expires_at > now)
            .count()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut locks = self.locks.write().await;
        let now = Instant::now();

        match locks.get(key) {
            Some(held) if held.expires_at > now => Ok(false),
            _ => {
                locks.insert(
                    key.to_string(),
                    Held {
                        token: token.to_string(),
                        expires_at: now + lease,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut locks = self.locks.write().await;
        match locks.get(key) {
            Some(held) if held.token == token && held.expires_at > Instant::now() => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let store = InMemoryLockStore::new();
        let lease = Duration::from_secs(10);

        assert!(store.try_acquire("k", "a", lease).await.unwrap());
        assert!(!store.try_acquire("k", "b", lease).await.unwrap());
        assert_eq!(store.held_count().await, 1);
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let store = InMemoryLockStore::new();
        let lease = Duration::from_secs(10);

        store.try_acquire("k", "a", lease).await.unwrap();

        assert!(!store.release("k", "b").await.unwrap());
        assert!(store.release("k", "a").await.unwrap());
        assert!(store.try_acquire("k", "b", lease).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_counts_as_absent() {
        let store = InMemoryLockStore::new();

        store
            .try_acquire("k", "a", Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(store.try_acquire("k", "b", Duration::from_secs(5)).await.unwrap());
        // Stale holder cannot release the new holder's lock.
        assert!(!store.release("k", "a").await.unwrap());
    }
}
