//! Deferred request queue.

use crate::error::SdkResult;
use crate::response::ResponseEnvelope;
use crate::transport::{send_multi, PreparedRequest, Transport};
use serde::{Deserialize, Serialize};

/// Position of a queued request; responses are returned at this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchHandle {
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchQueue {
    requests: Vec<PreparedRequest>,
    limit: Option<usize>,
}

impl BatchQueue {
    /// Unbounded queue: every request is in flight at once.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue with at most `limit` requests in flight (minimum 1).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            requests: Vec::new(),
            limit: Some(limit.max(1)),
        }
    }

    pub fn push(&mut self, request: PreparedRequest) -> BatchHandle {
        self.requests.push(request);
        BatchHandle {
            index: self.requests.len() - 1,
        }
    }

    pub fn get(&self, handle: BatchHandle) -> Option<&PreparedRequest> {
        self.requests.get(handle.index)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    /// Send every queued request. The queue itself is left untouched.
    ///
    /// All or nothing: one transport fault fails the whole batch.
    pub async fn send(&self, transport: &dyn Transport) -> SdkResult<Vec<ResponseEnvelope>> {
        log::debug!(
            "Sending batch of {} request(s), window {:?}",
            self.requests.len(),
            self.limit
        );
        let responses = send_multi(transport, self.requests.clone(), self.limit).await?;
        Ok(responses.into_iter().map(ResponseEnvelope::from_http).collect())
    }
}
