//! # cloudfusion-cache – pluggable response cache
//!
//! Every backend exposes the same per-key contract ([`CacheStore`]):
//! `create` / `read` / `update` / `delete` plus the expiry trio
//! `is_expired` / `timestamp` / `reset`. [`CacheManager`] layers
//! read-through semantics on top of any store.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  CacheManager  (manager.rs)                  │
//! │  └── read-through + stale fallback + lock    │
//! ├──────────────────────────────────────────────┤
//! │  CacheBackend  (backend.rs)                  │
//! │  ├── MemoryPool   → MemoryStore  (TTL)       │
//! │  ├── directory    → FileStore    (mtime)     │
//! │  ├── SqlPool      → SqlStore     (row ts)    │
//! │  └── RedisPool    → RedisStore   (TTL)       │
//! ├──────────────────────────────────────────────┤
//! │  PayloadCodec  (codec.rs)  json + zlib       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod codec;
pub mod distributed;
pub mod error;
pub mod file;
pub mod manager;
pub mod memory;
pub mod sql;
pub mod store;

pub use backend::{CacheBackend, CacheLocation, CacheSelector};
pub use codec::PayloadCodec;
pub use distributed::{RedisPool, RedisStore, ServerAddr};
pub use error::{CacheError, CacheErrorKind, CacheResult};
pub use file::FileStore;
pub use manager::{response_manager, CacheManager, LockPolicy};
pub use memory::{MemoryPool, MemoryStore};
pub use sql::{SqlPool, SqlStore};
pub use store::{CacheStore, StoreSettings};
