//! Runtime error type.
//!
//! Only two classes of failure surface as errors: configuration faults
//! (programmer mistakes detected at call time) and transport faults
//! (the request never produced an HTTP response). Any HTTP status,
//! including 4xx/5xx, is delivered as an ordinary [`ResponseEnvelope`].
//!
//! [`ResponseEnvelope`]: crate::response::ResponseEnvelope

use cloudfusion_cache::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdkErrorKind {
    /// Missing credentials, unknown operation, modifiers used out of sequence.
    Config,
    /// DNS, connect, TLS or timeout failure.
    Transport,
    /// A request could not be assembled or signed.
    Signing,
    /// Malformed caller input such as an expiry string.
    Parse,
    /// A cache backend could not be resolved.
    Cache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkError {
    pub kind: SdkErrorKind,
    pub message: String,
    /// Operation being executed when the error occurred.
    pub operation: Option<String>,
    /// Position inside a batch, for batch transport faults.
    pub batch_index: Option<usize>,
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(ref op) = self.operation {
            write!(f, " (operation: {op})")?;
        }
        if let Some(idx) = self.batch_index {
            write!(f, " (batch index: {idx})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SdkError {}

impl SdkError {
    pub fn new(kind: SdkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: None,
            batch_index: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(SdkErrorKind::Config, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SdkErrorKind::Transport, message)
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::new(SdkErrorKind::Signing, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SdkErrorKind::Parse, message)
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_batch_index(mut self, index: usize) -> Self {
        self.batch_index = Some(index);
        self
    }

    pub fn is_config(&self) -> bool {
        self.kind == SdkErrorKind::Config
    }

    pub fn is_transport(&self) -> bool {
        self.kind == SdkErrorKind::Transport
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        let what = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connect failed"
        } else {
            "failed"
        };
        Self::transport(format!("HTTP request {what}: {err}"))
    }
}

impl From<CacheError> for SdkError {
    fn from(err: CacheError) -> Self {
        Self::new(SdkErrorKind::Cache, err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_context() {
        let err = SdkError::transport("connection reset")
            .with_operation("ListDomains")
            .with_batch_index(2);
        let s = err.to_string();
        assert!(s.contains("Transport"));
        assert!(s.contains("ListDomains"));
        assert!(s.contains("batch index: 2"));
    }

    #[test]
    fn kind_predicates() {
        assert!(SdkError::config("no key").is_config());
        assert!(!SdkError::config("no key").is_transport());
        assert!(SdkError::transport("dns").is_transport());
    }

    #[test]
    fn cache_error_converts() {
        let err: SdkError = CacheError::invalid_location("???").into();
        assert_eq!(err.kind, SdkErrorKind::Cache);
        assert!(err.message.contains("???"));
    }

    #[test]
    fn serde_roundtrip() {
        let err = SdkError::config("missing secret").with_operation("PutAttributes");
        let json = serde_json::to_string(&err).unwrap();
        let back: SdkError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, SdkErrorKind::Config);
        assert_eq!(back.operation.as_deref(), Some("PutAttributes"));
    }
}
