//! Backend selection.
//!
//! A cache location is resolved once, at configuration time, into a
//! connected [`CacheBackend`]; per-call store handles are then cheap to
//! open from it.
//!
//! | Selector                     | Backend              |
//! |------------------------------|----------------------|
//! | `apc`, `memory`, `xcache`    | in-process memory    |
//! | `pdo.sqlite:<path>`          | relational (SQLite)  |
//! | `[{host, port}, …]`          | distributed (Redis)  |
//! | any other string             | directory on disk    |

use crate::distributed::{RedisPool, ServerAddr};
use crate::error::{CacheError, CacheResult};
use crate::file::FileStore;
use crate::memory::MemoryPool;
use crate::sql::SqlPool;
use crate::store::{CacheStore, StoreSettings};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

const MEMORY_TOKENS: &[&str] = &["apc", "memory", "xcache"];

/// Where cached responses live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    Memory,
    File(PathBuf),
    /// DSN with the `pdo.` prefix removed, e.g. `sqlite:/tmp/cache.db`.
    Sql(String),
    Distributed(Vec<ServerAddr>),
}

impl FromStr for CacheLocation {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CacheError::invalid_location(s));
        }
        if MEMORY_TOKENS.iter().any(|t| s.eq_ignore_ascii_case(t)) {
            return Ok(Self::Memory);
        }
        if let Some(dsn) = s.strip_prefix("pdo.") {
            if dsn.is_empty() {
                return Err(CacheError::invalid_location(s));
            }
            return Ok(Self::Sql(dsn.to_string()));
        }
        Ok(Self::File(PathBuf::from(s)))
    }
}

/// Serialized form of a cache location in configuration files: either a
/// selector string or a list of distributed servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheSelector {
    Location(String),
    Servers(Vec<ServerAddr>),
}

impl CacheSelector {
    pub fn resolve(&self) -> CacheResult<CacheLocation> {
        match self {
            Self::Location(s) => s.parse(),
            Self::Servers(servers) if servers.is_empty() => {
                Err(CacheError::invalid_location("empty server list"))
            }
            Self::Servers(servers) => Ok(CacheLocation::Distributed(servers.clone())),
        }
    }
}

/// A connected backend from which per-key stores are opened.
#[derive(Debug, Clone)]
pub enum CacheBackend {
    Memory(MemoryPool),
    File(PathBuf),
    Sql(SqlPool),
    Distributed(RedisPool),
}

impl CacheBackend {
    pub async fn connect(location: &CacheLocation) -> CacheResult<Self> {
        let backend = match location {
            CacheLocation::Memory => Self::Memory(MemoryPool::new()),
            CacheLocation::File(dir) => Self::File(dir.clone()),
            CacheLocation::Sql(dsn) => Self::Sql(SqlPool::connect(dsn).await?),
            CacheLocation::Distributed(servers) => {
                Self::Distributed(RedisPool::connect(servers).await?)
            }
        };
        info!("Cache backend resolved: {}", backend.name());
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::File(_) => "file",
            Self::Sql(_) => "sql",
            Self::Distributed(_) => "distributed",
        }
    }

    /// Open a store handle bound to `key`.
    pub fn open(&self, key: &str, expires: u64, compress: bool) -> Box<dyn CacheStore> {
        let settings = StoreSettings::new(key, expires, compress);
        match self {
            Self::Memory(pool) => Box::new(pool.store(settings)),
            Self::File(dir) => Box::new(FileStore::new(dir, settings)),
            Self::Sql(pool) => Box::new(pool.store(settings)),
            Self::Distributed(pool) => Box::new(pool.store(settings)),
        }
    }
}
