//! Distributed mutex with lease-bounded ownership.
//!
//! Acquisition is a conditional set-if-absent of a unique token under
//! `lock:{resource}`, polled until a deadline. Release deletes the key only
//! if it still holds the caller's token, so a lock that expired and was
//! re-acquired elsewhere is never released by the old holder. The lease
//! bounds worst-case hold time if a holder crashes - that is the property
//! standing in for explicit failure detection.

pub mod error;
pub mod guard;
pub mod memory;
pub mod mutex;
pub mod redis;
pub mod store;

pub use error::{LockError, Result};
pub use guard::LockGuard;
pub use memory::InMemoryLockStore;
pub use mutex::DistributedMutex;
pub use self::redis::RedisLockStore;
pub use store::LockStore;
