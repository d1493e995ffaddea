use std::sync::Arc;

use crate::{LockStore, Result};

/// Handle to an acquired lock.
///
/// The guard releases the lock on every exit path: explicitly through
/// [`LockGuard::release`], or as a best-effort background task when
/// dropped (cancellation, early return, panic unwind). If the process
/// dies before either happens, the lease expiry reclaims the key.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(store: Arc<dyn LockStore>, key: String, token: String) -> Self {
        Self {
            store,
            key,
            token,
            released: false,
        }
    }

    /// Returns the namespaced key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock, deleting the key only if this guard's token is
    /// still the stored one.
    ///
    /// Returns false if the lease had already expired and the key was
    /// gone or re-acquired by another holder.
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        let deleted = self.store.release(&self.key, &self.token).await?;
        if !deleted {
            tracing::warn!(key = %self.key, "lock already expired at release");
        }
        Ok(deleted)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release(&key, &token).await {
                        tracing::warn!(key = %key, error = %e, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                // No runtime to release on; the lease expiry reclaims it.
                tracing::warn!(key = %key, "lock guard dropped outside a runtime");
            }
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}
