//! HTTP transport.
//!
//! [`Transport`] is the seam between the runtime and the network: the
//! runtime only ever hands over fully signed [`PreparedRequest`]s. The
//! production implementation is [`HttpTransport`] (reqwest); tests plug in
//! scripted transports.
//!
//! [`send_multi`] runs a batch with a rolling concurrency window on the
//! calling task: at most `limit` requests are in flight (all of them when
//! no limit is given), one more is admitted per completion, and responses
//! come back in submission order.

use crate::config::RuntimeConfig;
use crate::error::{SdkError, SdkResult};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A signed request ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub method: String,
    /// Full URL including scheme, host and optional port.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Overall timeout overriding the client default.
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    pub fn post(url: &str, body: String) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            body,
            timeout: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, headers and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Only connection-level failures are errors; any
    /// HTTP status is returned as a response.
    async fn send(&self, request: &PreparedRequest) -> SdkResult<HttpResponse>;
}

// ── reqwest transport ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(config: &RuntimeConfig) -> SdkResult<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .user_agent(config.user_agent.as_str());

        if let Some(ref proxy) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SdkError::config(format!("Invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| SdkError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> SdkResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| SdkError::config(format!("Invalid HTTP method: {}", request.method)))?;

        let mut req = self.http.request(method, &request.url);
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }
        if !request.body.is_empty() {
            req = req.body(request.body.clone());
        }

        let resp = req.send().await?;

        let status = resp.status().as_u16();
        let mut headers = BTreeMap::new();
        for (key, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_string(), v.to_string());
            }
        }
        let body = resp.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ── Batch execution ─────────────────────────────────────────────────────

async fn dispatch(
    transport: &dyn Transport,
    index: usize,
    request: PreparedRequest,
) -> (usize, SdkResult<HttpResponse>) {
    (index, transport.send(&request).await)
}

/// Send `requests` with at most `limit` in flight, or all at once when
/// `limit` is `None`.
///
/// The first transport fault aborts the whole batch: requests still in
/// flight are dropped and no partial results are returned. The error
/// carries the failing request's index.
pub async fn send_multi(
    transport: &dyn Transport,
    requests: Vec<PreparedRequest>,
    limit: Option<usize>,
) -> SdkResult<Vec<HttpResponse>> {
    let total = requests.len();
    let limit = limit.unwrap_or(total).max(1);
    let mut pending = requests.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();

    for (index, request) in pending.by_ref().take(limit) {
        in_flight.push(dispatch(transport, index, request));
    }

    let mut done = BTreeMap::new();
    while let Some((index, result)) = in_flight.next().await {
        match result {
            Ok(response) => {
                log::debug!(
                    "Batch request {index} completed with status {} ({}/{total})",
                    response.status,
                    done.len() + 1
                );
                done.insert(index, response);
            }
            Err(e) => {
                log::warn!("Batch aborted: request {index} failed: {e}");
                return Err(e.with_batch_index(index));
            }
        }
        if let Some((next, request)) = pending.next() {
            in_flight.push(dispatch(transport, next, request));
        }
    }

    Ok(done.into_values().collect())
}
