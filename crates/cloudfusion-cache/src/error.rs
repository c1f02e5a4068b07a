//! Error type for cache backend construction.
//!
//! Read/write faults on an established backend never surface as errors:
//! they are logged and reported as a miss or a failed write. `CacheError`
//! only covers misconfiguration (unknown selector, unreachable server,
//! unusable DSN) detected while a backend is being resolved.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheErrorKind {
    /// The location selector string could not be mapped to a backend.
    InvalidLocation,
    /// The backend service could not be reached or initialised.
    ConnectionFailed,
    /// Schema creation or another setup statement failed.
    SetupFailed,
    /// A payload could not be encoded for storage.
    Encoding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheError {
    pub kind: CacheErrorKind,
    pub message: String,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    pub fn new(kind: CacheErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_location(location: &str) -> Self {
        Self::new(
            CacheErrorKind::InvalidLocation,
            format!("Unrecognised cache location: {location}"),
        )
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(CacheErrorKind::ConnectionFailed, message)
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(CacheErrorKind::SetupFailed, format!("SQL: {err}"))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::connection_failed(format!("Redis: {err}"))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
