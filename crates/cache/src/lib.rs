//! Cache-aside key/value store.
//!
//! Callers own the read-through pattern: check the cache, fall back to the
//! system of record on a miss, then populate the cache. Mutation paths call
//! [`Cache::remove`] so staleness is bounded by one cache generation.
//!
//! Cache failures must never fail the authoritative path - consumers treat
//! any [`CacheError`] as a miss, log it, and continue.

pub mod error;
pub mod keys;
pub mod memory;
pub mod redis;
pub mod store;

pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use self::redis::RedisCache;
pub use store::{Cache, CacheExt};
