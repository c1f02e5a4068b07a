//! In-process cache with native TTL.
//!
//! All handles opened from the same [`MemoryPool`] share one map, so two
//! handles bound to the same key observe each other's writes. Expired
//! entries are dropped on access, and swept from the whole map on writes
//! once it grows past [`PRUNE_THRESHOLD`].

use crate::codec::PayloadCodec;
use crate::store::{CacheStore, StoreSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Map size at which writes sweep out expired entries.
pub const PRUNE_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: Vec<u8>,
    deadline: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self) -> bool {
        self.deadline.map_or(true, |d| Instant::now() < d)
    }
}

/// Shared backing map for in-process stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, settings: StoreSettings) -> MemoryStore {
        MemoryStore {
            codec: PayloadCodec::new(settings.compress),
            pool: self.clone(),
            settings,
        }
    }

    /// Number of live entries, lock markers included.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn prune(entries: &mut HashMap<String, MemoryEntry>) {
        if entries.len() < PRUNE_THRESHOLD {
            return;
        }
        let before = entries.len();
        entries.retain(|_, e| e.is_live());
        debug!("Pruned {} expired memory cache entries", before - entries.len());
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) {
        let deadline = ttl.map(|t| Instant::now() + t);
        let mut entries = self.entries.lock().await;
        Self::prune(&mut entries);
        entries.insert(key.to_string(), MemoryEntry { payload, deadline });
    }

    async fn add(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.get(key).map_or(false, |e| e.is_live()) {
            return false;
        }
        Self::prune(&mut entries);
        let deadline = ttl.map(|t| Instant::now() + t);
        entries.insert(key.to_string(), MemoryEntry { payload, deadline });
        true
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live() => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn remove(&self, key: &str) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    #[cfg(test)]
    async fn raw_len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// A memory-pool handle bound to one key.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    pool: MemoryPool,
    settings: StoreSettings,
    codec: PayloadCodec,
}

impl MemoryStore {
    fn ttl(&self) -> Option<Duration> {
        match self.settings.expires {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    async fn put(&self, data: &Value) -> bool {
        match self.codec.encode(data) {
            Ok(payload) => {
                self.pool.set(&self.settings.key, payload, self.ttl()).await;
                true
            }
            Err(e) => {
                warn!("Memory cache write for {} failed: {e}", self.settings.key);
                false
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn create(&self, data: &Value) -> bool {
        self.put(data).await
    }

    async fn read(&self) -> Option<Value> {
        let payload = self.pool.get(&self.settings.key).await?;
        match self.codec.decode(&payload) {
            Some(value) => Some(value),
            None => {
                warn!("Discarding corrupt memory cache entry {}", self.settings.key);
                self.pool.remove(&self.settings.key).await;
                None
            }
        }
    }

    async fn update(&self, data: &Value) -> bool {
        self.put(data).await
    }

    async fn delete(&self) -> bool {
        self.pool.remove(&self.settings.key).await
    }

    async fn is_expired(&self) -> bool {
        false
    }

    async fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn reset(&self) -> bool {
        true
    }

    async fn lock(&self, ttl: Duration) -> bool {
        let acquired = self
            .pool
            .add(&self.settings.lock_key(), b"1".to_vec(), Some(ttl))
            .await;
        debug!("Memory lock {} acquired={acquired}", self.settings.lock_key());
        acquired
    }

    async fn unlock(&self) {
        self.pool.remove(&self.settings.lock_key()).await;
    }
}
