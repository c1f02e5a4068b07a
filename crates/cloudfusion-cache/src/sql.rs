//! Relational cache on SQLite through sqlx.
//!
//! Rows live in a single `cache` table keyed by identity key. The
//! `expires` column holds the entry timestamp in milliseconds since the
//! epoch; lifetime is evaluated by this layer.

use crate::codec::PayloadCodec;
use crate::error::{CacheError, CacheResult};
use crate::store::{has_expired, CacheStore, StoreSettings};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache (\
    id TEXT NOT NULL PRIMARY KEY, \
    expires INTEGER NOT NULL, \
    data BLOB NULL)";

/// Translate a `pdo.`-style DSN body into an sqlx connection URL.
///
/// Only the SQLite driver is available; `sqlite::memory:` and
/// `sqlite:/path/to/file.db` are accepted.
pub fn sqlx_url(dsn: &str) -> CacheResult<String> {
    let (driver, target) = dsn
        .split_once(':')
        .ok_or_else(|| CacheError::invalid_location(dsn))?;
    if !driver.eq_ignore_ascii_case("sqlite") {
        return Err(CacheError::invalid_location(&format!(
            "pdo.{dsn} (unsupported driver '{driver}')"
        )));
    }
    match target {
        "" => Err(CacheError::invalid_location(dsn)),
        ":memory:" => Ok("sqlite::memory:".to_string()),
        path => Ok(format!("sqlite://{path}?mode=rwc")),
    }
}

/// Connected relational pool shared by all SQL store handles.
#[derive(Debug, Clone)]
pub struct SqlPool {
    pool: SqlitePool,
}

impl SqlPool {
    pub async fn connect(dsn: &str) -> CacheResult<Self> {
        let url = sqlx_url(dsn)?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1) // SQLite single-writer; keeps :memory: alive
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect(&url)
            .await
            .map_err(|e| CacheError::connection_failed(format!("SQLite connect: {e}")))?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!("Relational cache ready at {url}");
        Ok(Self { pool })
    }

    pub fn store(&self, settings: StoreSettings) -> SqlStore {
        SqlStore {
            codec: PayloadCodec::new(settings.compress),
            pool: self.pool.clone(),
            settings,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
    settings: StoreSettings,
    codec: PayloadCodec,
}

impl SqlStore {
    fn encode(&self, data: &Value) -> Option<Vec<u8>> {
        match self.codec.encode(data) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("SQL cache encode for {} failed: {e}", self.settings.key);
                None
            }
        }
    }
}

#[async_trait]
impl CacheStore for SqlStore {
    fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn create(&self, data: &Value) -> bool {
        let Some(payload) = self.encode(data) else {
            return false;
        };
        let result = sqlx::query("INSERT OR IGNORE INTO cache (id, expires, data) VALUES (?, ?, ?)")
            .bind(&self.settings.key)
            .bind(Utc::now().timestamp_millis())
            .bind(payload)
            .execute(&self.pool)
            .await;
        match result {
            Ok(r) => r.rows_affected() == 1,
            Err(e) => {
                warn!("SQL cache create {} failed: {e}", self.settings.key);
                false
            }
        }
    }

    async fn read(&self) -> Option<Value> {
        let row: Option<(Option<Vec<u8>>,)> =
            match sqlx::query_as::<_, (Option<Vec<u8>>,)>("SELECT data FROM cache WHERE id = ?")
                .bind(&self.settings.key)
                .fetch_optional(&self.pool)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("SQL cache read {} failed: {e}", self.settings.key);
                    return None;
                }
            };

        let payload = row?.0?;
        match self.codec.decode(&payload) {
            Some(v) => Some(v),
            None => {
                warn!("Discarding corrupt SQL cache row {}", self.settings.key);
                self.delete().await;
                None
            }
        }
    }

    async fn update(&self, data: &Value) -> bool {
        let Some(payload) = self.encode(data) else {
            return false;
        };
        let result = sqlx::query(
            "INSERT INTO cache (id, expires, data) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET expires = excluded.expires, data = excluded.data",
        )
        .bind(&self.settings.key)
        .bind(Utc::now().timestamp_millis())
        .bind(payload)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("SQL cache update {} failed: {e}", self.settings.key);
                false
            }
        }
    }

    async fn delete(&self) -> bool {
        match sqlx::query("DELETE FROM cache WHERE id = ?")
            .bind(&self.settings.key)
            .execute(&self.pool)
            .await
        {
            Ok(r) => r.rows_affected() > 0,
            Err(e) => {
                warn!("SQL cache delete {} failed: {e}", self.settings.key);
                false
            }
        }
    }

    async fn is_expired(&self) -> bool {
        has_expired(self.timestamp().await, self.settings.expires)
    }

    async fn timestamp(&self) -> Option<DateTime<Utc>> {
        let millis: Option<i64> = sqlx::query_scalar::<_, i64>("SELECT expires FROM cache WHERE id = ?")
            .bind(&self.settings.key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten();
        millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    async fn reset(&self) -> bool {
        match sqlx::query("UPDATE cache SET expires = ? WHERE id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(&self.settings.key)
            .execute(&self.pool)
            .await
        {
            Ok(r) => r.rows_affected() > 0,
            Err(e) => {
                warn!("SQL cache reset {} failed: {e}", self.settings.key);
                false
            }
        }
    }
}
