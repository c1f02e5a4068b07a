//! Distributed cache on one or more Redis servers.
//!
//! Keys are spread across the configured servers by a stable hash, the
//! same way a memcache client shards its pool. Expiry is delegated to the
//! server (`SET … EX`), so this layer never reports an entry as expired.

use crate::codec::PayloadCodec;
use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, StoreSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// A host/port pair of the distributed pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn to_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

struct ServerHandle {
    addr: ServerAddr,
    connection: MultiplexedConnection,
}

/// Connected server pool shared by all distributed store handles.
#[derive(Clone)]
pub struct RedisPool {
    servers: Arc<Vec<ServerHandle>>,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let addrs: Vec<&ServerAddr> = self.servers.iter().map(|s| &s.addr).collect();
        f.debug_struct("RedisPool").field("servers", &addrs).finish()
    }
}

impl RedisPool {
    /// Open a multiplexed connection to every server in `addrs`.
    pub async fn connect(addrs: &[ServerAddr]) -> CacheResult<Self> {
        if addrs.is_empty() {
            return Err(CacheError::invalid_location("empty server list"));
        }

        let mut servers = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let client = redis::Client::open(addr.to_url().as_str()).map_err(|e| {
                CacheError::connection_failed(format!("Failed to create client for {}: {e}", addr.to_url()))
            })?;
            let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
                CacheError::connection_failed(format!("Failed to connect to {}: {e}", addr.to_url()))
            })?;
            info!("Distributed cache connected to {}:{}", addr.host, addr.port);
            servers.push(ServerHandle {
                addr: addr.clone(),
                connection,
            });
        }

        Ok(Self {
            servers: Arc::new(servers),
        })
    }

    pub fn store(&self, settings: StoreSettings) -> RedisStore {
        RedisStore {
            codec: PayloadCodec::new(settings.compress),
            pool: self.clone(),
            settings,
        }
    }

    fn connection_for(&self, key: &str) -> MultiplexedConnection {
        let idx = shard_index(key, self.servers.len());
        self.servers[idx].connection.clone()
    }
}

/// Stable server selection for `key` among `servers` entries.
pub fn shard_index(key: &str, servers: usize) -> usize {
    if servers <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % servers as u64) as usize
}

#[derive(Debug, Clone)]
pub struct RedisStore {
    pool: RedisPool,
    settings: StoreSettings,
    codec: PayloadCodec,
}

impl RedisStore {
    async fn set(&self, data: &Value) -> bool {
        let payload = match self.codec.encode(data) {
            Ok(p) => p,
            Err(e) => {
                warn!("Distributed cache encode for {} failed: {e}", self.settings.key);
                return false;
            }
        };

        let mut con = self.pool.connection_for(&self.settings.key);
        let result: redis::RedisResult<()> = match self.settings.expires {
            0 => con.set(&self.settings.key, payload).await,
            secs => con.set_ex(&self.settings.key, payload, secs).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Distributed cache SET {} failed: {e}", self.settings.key);
                false
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn create(&self, data: &Value) -> bool {
        self.set(data).await
    }

    async fn read(&self) -> Option<Value> {
        let mut con = self.pool.connection_for(&self.settings.key);
        let payload: Option<Vec<u8>> = match con.get(&self.settings.key).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Distributed cache GET {} failed: {e}", self.settings.key);
                return None;
            }
        };
        let payload = payload?;
        match self.codec.decode(&payload) {
            Some(v) => Some(v),
            None => {
                warn!("Discarding corrupt distributed cache entry {}", self.settings.key);
                self.delete().await;
                None
            }
        }
    }

    async fn update(&self, data: &Value) -> bool {
        self.set(data).await
    }

    async fn delete(&self) -> bool {
        let mut con = self.pool.connection_for(&self.settings.key);
        let removed: redis::RedisResult<i64> = con.del(&self.settings.key).await;
        matches!(removed, Ok(n) if n > 0)
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
        let lock_key = self.settings.lock_key();
        let mut con = self.pool.connection_for(&self.settings.key);
        let reply: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut con)
            .await;
        match reply {
            Ok(r) => {
                debug!("Distributed lock {lock_key} acquired={}", r.is_some());
                r.is_some()
            }
            Err(e) => {
                warn!("Distributed lock {lock_key} failed: {e}");
                false
            }
        }
    }

    async fn unlock(&self) {
        let mut con = self.pool.connection_for(&self.settings.key);
        let removed: redis::RedisResult<i64> = con.del(self.settings.lock_key()).await;
        if let Err(e) = removed {
            warn!("Distributed unlock {} failed: {e}", self.settings.lock_key());
        }
    }
}
