use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Cache, CacheError, Result};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory cache implementation for testing and single-process use.
///
/// Expired entries are dropped lazily on access. TTLs use the tokio clock,
/// so paused-clock tests can drive expiry deterministically.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Returns true if no live entries exist.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    fn expiry(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|d| Instant::now() + d)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => match &entry.value {
                Value::Text(s) => Ok(Some(s.clone())),
                Value::Set(_) => Err(CacheError::WrongType {
                    key: key.to_string(),
                    message: "set value read as string".to_string(),
                }),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let existed = entries
            .remove(key)
            .is_some_and(|e| !e.is_expired(Instant::now()));
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired(Instant::now())))
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.add_signed(key, by).await
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.add_signed(key, -by).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            };
        }

        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            Value::Text(_) => Err(CacheError::WrongType {
                key: key.to_string(),
                message: "string value used as set".to_string(),
            }),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                Value::Text(_) => Err(CacheError::WrongType {
                    key: key.to_string(),
                    message: "string value used as set".to_string(),
                }),
            },
            _ => Ok(Vec::new()),
        }
    }
}

impl InMemoryCache {
    async fn add_signed(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Value::Text(s) => s.parse::<i64>().map_err(|_| CacheError::WrongType {
                    key: key.to_string(),
                    message: "value is not an integer".to_string(),
                })?,
                Value::Set(_) => {
                    return Err(CacheError::WrongType {
                        key: key.to_string(),
                        message: "set value used as counter".to_string(),
                    });
                }
            },
            _ => 0,
        };

        let next = current + delta;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(next.to_string()),
                expires_at: None,
            },
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_miss_returns_none() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).await.unwrap();

        assert!(cache.remove("k").await.unwrap());
        assert!(!cache.remove("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_secs(30)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let cache = InMemoryCache::new();

        assert_eq!(cache.increment("n", 1).await.unwrap(), 1);
        assert_eq!(cache.increment("n", 5).await.unwrap(), 6);
        assert_eq!(cache.decrement("n", 2).await.unwrap(), 4);
        assert_eq!(cache.decrement("missing", 1).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_increment_non_integer_fails() {
        let cache = InMemoryCache::new();
        cache.set("k", "not a number", None).await.unwrap();

        let result = cache.increment("k", 1).await;
        assert!(matches!(result, Err(CacheError::WrongType { .. })));
    }

    #[tokio::test]
    async fn test_set_add_reports_new_members() {
        let cache = InMemoryCache::new();

        assert!(cache.set_add("s", "a").await.unwrap());
        assert!(cache.set_add("s", "b").await.unwrap());
        assert!(!cache.set_add("s", "a").await.unwrap());

        let mut members = cache.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_set_members_absent_is_empty() {
        let cache = InMemoryCache::new();
        assert!(cache.set_members("absent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typed_json_roundtrip() {
        use crate::CacheExt;

        let cache = InMemoryCache::new();
        cache
            .set_json("k", &vec![1u32, 2, 3], None)
            .await
            .unwrap();

        let got: Option<Vec<u32>> = cache.get_json("k").await.unwrap();
        assert_eq!(got, Some(vec![1, 2, 3]));
    }
}
