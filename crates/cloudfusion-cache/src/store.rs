//! The per-key store contract implemented by every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

/// Construction parameters shared by all stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Identity key the store handle is bound to.
    pub key: String,
    /// Lifetime of an entry in seconds. `0` means "no TTL" for backends
    /// that expire natively, and "immediately stale" for the others.
    pub expires: u64,
    /// Whether payloads are zlib-compressed before storage.
    pub compress: bool,
}

impl StoreSettings {
    pub fn new(key: impl Into<String>, expires: u64, compress: bool) -> Self {
        Self {
            key: key.into(),
            expires,
            compress,
        }
    }

    /// Name of the lock marker paired with this key.
    pub fn lock_key(&self) -> String {
        format!("{}.lock", self.key)
    }
}

/// A cache handle bound to one identity key.
///
/// Faults inside a backend are logged and reported through the return
/// value (`None` for reads, `false` for writes); they never abort the caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn settings(&self) -> &StoreSettings;

    /// Store `data` for the bound key. File and relational stores refuse
    /// to overwrite an existing entry; TTL-native stores set unconditionally.
    async fn create(&self, data: &Value) -> bool;

    /// Fetch the stored value, or `None` on a miss. A payload that cannot
    /// be decoded is deleted and reported as a miss.
    async fn read(&self) -> Option<Value>;

    /// Overwrite the stored value unconditionally.
    async fn update(&self, data: &Value) -> bool;

    async fn delete(&self) -> bool;

    /// Whether the entry has outlived its lifetime. Always `false` for
    /// stores whose backend enforces expiry itself.
    async fn is_expired(&self) -> bool;

    /// Creation (or last reset) time of the entry, when tracked.
    async fn timestamp(&self) -> Option<DateTime<Utc>>;

    /// Restart the entry's lifetime without touching its payload.
    async fn reset(&self) -> bool;

    /// Try to place the lock marker for this key. Stores without a lock
    /// marker always report success.
    async fn lock(&self, _ttl: Duration) -> bool {
        true
    }

    async fn unlock(&self) {}

    fn key(&self) -> &str {
        &self.settings().key
    }
}

/// Expiry check for stores that track their own timestamps.
pub(crate) fn has_expired(timestamp: Option<DateTime<Utc>>, expires: u64) -> bool {
    match timestamp {
        Some(ts) => {
            let lifetime = chrono::Duration::seconds(expires.min(u32::MAX as u64) as i64);
            Utc::now() >= ts + lifetime
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_lifetime_is_expired_immediately() {
        assert!(has_expired(Some(Utc::now()), 0));
    }

    #[test]
    fn future_expiry_is_fresh() {
        assert!(!has_expired(Some(Utc::now()), 3600));
    }

    #[test]
    fn missing_timestamp_counts_as_expired() {
        assert!(has_expired(None, 3600));
    }

    #[test]
    fn lock_key_is_derived_from_key() {
        let s = StoreSettings::new("abc", 10, false);
        assert_eq!(s.lock_key(), "abc.lock");
    }
}
