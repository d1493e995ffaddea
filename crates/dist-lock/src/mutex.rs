use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::{LockGuard, LockStore, Result};

/// Interval between acquisition attempts while waiting for a lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Cluster-wide mutex front end over a [`LockStore`].
///
/// Callers pick the resource name; it must be granular enough not to
/// serialize unrelated work (per business key, not global).
#[derive(Clone)]
pub struct DistributedMutex {
    store: Arc<dyn LockStore>,
    retry_interval: Duration,
}

impl DistributedMutex {
    /// Creates a mutex over the given store.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Overrides the polling interval between attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Acquires the lock for `resource`, waiting up to `max_wait`.
    ///
    /// Returns `Ok(None)` when the wait window elapses without the lock
    /// becoming free - the operation is in progress elsewhere and the
    /// caller should surface a conflict, not crash. A returned guard owns
    /// the key for at most `lease`, after which the store reclaims it.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(
        &self,
        resource: &str,
        lease: Duration,
        max_wait: Duration,
    ) -> Result<Option<LockGuard>> {
        let key = format!("lock:{resource}");
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + max_wait;

        loop {
            if self.store.try_acquire(&key, &token, lease).await? {
                metrics::counter!("lock_acquired_total").increment(1);
                tracing::debug!(key = %key, "lock acquired");
                return Ok(Some(LockGuard::new(
                    Arc::clone(&self.store),
                    key,
                    token,
                )));
            }

            if Instant::now() >= deadline {
                metrics::counter!("lock_wait_timeouts_total").increment(1);
                tracing::warn!(key = %key, "lock not acquired within wait window");
                return Ok(None);
            }

            tokio::time::sleep(self.retry_interval).await;
        }
    }
}
