//! Read-through cache orchestration.
//!
//! [`CacheManager::response_manager`] serves a cached value while it is
//! fresh, refreshes it through the caller's callback once it is stale, and
//! falls back to the stale value (with its lifetime extended) when the
//! refresh produces nothing.

use crate::store::CacheStore;
use log::{debug, info, warn};
use rand::Rng;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Lock-and-read settings for stores that support a lock marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPolicy {
    /// Give up waiting and refresh anyway after this long.
    pub ceiling: Duration,
    /// Upper bound for one jittered wait between attempts.
    pub max_backoff: Duration,
    /// Lifetime of the lock marker itself.
    pub lock_ttl: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(5),
            max_backoff: Duration::from_millis(250),
            lock_ttl: Duration::from_secs(30),
        }
    }
}

enum LockOutcome {
    Acquired,
    /// Another caller refreshed the entry while we waited.
    Fresh(Value),
    TimedOut,
    /// No lock policy configured.
    Skipped,
}

pub struct CacheManager<'a> {
    store: &'a dyn CacheStore,
    lock: Option<LockPolicy>,
}

impl<'a> CacheManager<'a> {
    pub fn new(store: &'a dyn CacheStore) -> Self {
        Self { store, lock: None }
    }

    pub fn with_lock(mut self, policy: LockPolicy) -> Self {
        self.lock = Some(policy);
        self
    }

    /// Serve the cached value for this store, refreshing it with `refresh`
    /// on a miss or once it has expired.
    ///
    /// Returns `None` only when nothing was cached and the refresh yielded
    /// nothing either.
    pub async fn response_manager<F, Fut>(&self, refresh: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Value>>,
    {
        let key = self.store.key().to_string();

        if let Some(data) = self.store.read().await {
            if !self.store.is_expired().await {
                debug!("Cache hit for {key}");
                return Some(data);
            }

            let locked = match self.acquire().await {
                LockOutcome::Fresh(v) => return Some(v),
                LockOutcome::Acquired => true,
                LockOutcome::TimedOut | LockOutcome::Skipped => false,
            };

            info!("Cache entry {key} expired, refreshing");
            let served = match refresh().await {
                Some(fresh) => {
                    self.store.update(&fresh).await;
                    Some(fresh)
                }
                None => {
                    warn!("Refresh for {key} produced nothing, extending stale entry");
                    self.store.reset().await;
                    self.store.read().await.or(Some(data))
                }
            };
            self.release(locked).await;
            return served;
        }

        let locked = match self.acquire().await {
            LockOutcome::Fresh(v) => return Some(v),
            LockOutcome::Acquired => true,
            LockOutcome::TimedOut | LockOutcome::Skipped => false,
        };

        debug!("Cache miss for {key}");
        let fresh = refresh().await;
        if let Some(ref value) = fresh {
            if !self.store.create(value).await {
                debug!("Cache create for {key} did not store a new entry");
            }
        }
        self.release(locked).await;
        fresh
    }

    async fn acquire(&self) -> LockOutcome {
        let Some(ref policy) = self.lock else {
            return LockOutcome::Skipped;
        };

        let deadline = Instant::now() + policy.ceiling;
        loop {
            if self.store.lock(policy.lock_ttl).await {
                return LockOutcome::Acquired;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Lock wait for {} exceeded {:?}, proceeding without it",
                    self.store.key(),
                    policy.ceiling
                );
                return LockOutcome::TimedOut;
            }

            let ceiling_ms = policy.max_backoff.as_millis().max(1) as u64;
            let wait = Duration::from_millis(rand::thread_rng().gen_range(1..=ceiling_ms));
            tokio::time::sleep(wait).await;

            if let Some(v) = self.store.read().await {
                if !self.store.is_expired().await {
                    debug!("Entry {} refreshed by another holder", self.store.key());
                    return LockOutcome::Fresh(v);
                }
            }
        }
    }

    async fn release(&self, locked: bool) {
        if locked {
            self.store.unlock().await;
        }
    }
}

/// Shorthand for [`CacheManager::response_manager`] without locking.
pub async fn response_manager<F, Fut>(store: &dyn CacheStore, refresh: F) -> Option<Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<Value>>,
{
    CacheManager::new(store).response_manager(refresh).await
}
