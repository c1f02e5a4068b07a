//! Request runtime.
//!
//! [`Runtime::authenticate`] turns an operation name and parameters into a
//! signed request and then, depending on the modifiers set for this call:
//!
//! * `cache(expiry)` → serves through the response cache, sending only on
//!   a miss or once the entry is stale,
//! * `delete_cache()` → drops the cached entry instead of sending,
//! * `batch()` → queues the request and returns a [`BatchHandle`],
//! * `returnRawRequest` parameter → returns the prepared request unsent,
//! * otherwise → sends it, retrying 500/503 with `4^n × base` backoff.
//!
//! Modifiers apply to the next `authenticate` (or `send_batch`) only.

use crate::batch::{BatchHandle, BatchQueue};
use crate::config::RuntimeConfig;
use crate::error::{SdkError, SdkErrorKind, SdkResult};
use crate::expiry::CacheExpiry;
use crate::params::{Params, RETURN_RAW_KEY};
use crate::registry::{OperationRegistry, ServiceDescriptor};
use crate::response::ResponseEnvelope;
use crate::signing::{sha256_hex, RequestSigner, SignatureVersion, SigningContext};
use crate::transport::{HttpTransport, PreparedRequest, Transport};
use cloudfusion_cache::{CacheBackend, CacheManager, LockPolicy};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Source of signing time and nonce.
pub type SigningClock = Arc<dyn Fn() -> SigningContext + Send + Sync>;

/// What a call produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Response(ResponseEnvelope),
    /// Deferred into the active batch queue.
    Queued(BatchHandle),
    /// Signed but not sent (`returnRawRequest`).
    Prepared(PreparedRequest),
    /// Result of a `delete_cache()` call.
    CacheDeleted(bool),
}

impl Outcome {
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            Outcome::Response(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<ResponseEnvelope> {
        match self {
            Outcome::Response(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Modifiers {
    cache: Option<CacheExpiry>,
    delete_cache: bool,
    batch: bool,
}

pub struct Runtime {
    config: RuntimeConfig,
    service: ServiceDescriptor,
    registry: OperationRegistry,
    transport: Arc<dyn Transport>,
    signer: RequestSigner,
    cache: Option<CacheBackend>,
    lock: Option<LockPolicy>,
    queue: Option<BatchQueue>,
    pending: Modifiers,
    clock: SigningClock,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("service", &self.service.name)
            .field("cache", &self.cache.as_ref().map(CacheBackend::name))
            .field("queued", &self.queue.as_ref().map(BatchQueue::len))
            .finish()
    }
}

impl Runtime {
    /// Runtime backed by the reqwest transport.
    pub async fn new(config: RuntimeConfig, service: ServiceDescriptor) -> SdkResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, service, transport).await
    }

    /// Validates the configuration and resolves the cache backend.
    pub async fn with_transport(
        config: RuntimeConfig,
        service: ServiceDescriptor,
        transport: Arc<dyn Transport>,
    ) -> SdkResult<Self> {
        config.validate()?;

        let cache = match config.cache {
            Some(ref selector) => {
                let location = selector
                    .resolve()
                    .map_err(|e| SdkError::config(format!("Unknown cache selector: {e}")))?;
                Some(CacheBackend::connect(&location).await?)
            }
            None => None,
        };

        info!(
            "Runtime ready for {} ({}), cache: {}",
            service.name,
            service.default_host,
            cache.as_ref().map(CacheBackend::name).unwrap_or("none")
        );

        Ok(Self {
            signer: RequestSigner::from_credentials(&config.credentials),
            config,
            service,
            registry: OperationRegistry::new(),
            transport,
            cache,
            lock: None,
            queue: None,
            pending: Modifiers::default(),
            clock: Arc::new(SigningContext::now),
        })
    }

    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register `actions` signed with the service's default version.
    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.registry = self.service.operations(actions);
        self
    }

    /// Enable lock-and-read for stores that support a lock marker.
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock = Some(policy);
        self
    }

    pub fn with_clock(mut self, clock: SigningClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn cache_backend(&self) -> Option<&CacheBackend> {
        self.cache.as_ref()
    }

    pub fn batch_queue(&self) -> Option<&BatchQueue> {
        self.queue.as_ref()
    }

    // ── Call modifiers ──────────────────────────────────────────────────

    /// Serve the next call through the response cache.
    pub fn cache(&mut self, expiry: impl Into<CacheExpiry>) -> &mut Self {
        self.pending.cache = Some(expiry.into());
        self
    }

    /// Like [`Runtime::cache`] with an expiry such as `"1 hour"` or `"90"`.
    pub fn cache_for(&mut self, expiry: &str) -> SdkResult<&mut Self> {
        let expiry: CacheExpiry = expiry.parse()?;
        Ok(self.cache(expiry))
    }

    /// Delete the next call's cache entry instead of sending it.
    pub fn delete_cache(&mut self) -> &mut Self {
        self.pending.delete_cache = true;
        self
    }

    /// Queue the next call in the active batch, starting one if needed.
    pub fn batch(&mut self) -> &mut Self {
        self.queue.get_or_insert_with(BatchQueue::new);
        self.pending.batch = true;
        self
    }

    /// Queue the next call in `queue`, replacing the active batch.
    pub fn batch_with(&mut self, queue: BatchQueue) -> &mut Self {
        self.queue = Some(queue);
        self.pending.batch = true;
        self
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Resolve `method` through the registry and authenticate it against
    /// the service's default host.
    pub async fn call(&mut self, method: &str, params: Params) -> SdkResult<Outcome> {
        let Some(spec) = self.registry.get(method).cloned() else {
            self.pending = Modifiers::default();
            return Err(SdkError::config(format!(
                "Unknown operation '{method}' for service {}",
                self.service.name
            )));
        };
        let host = self.service.default_host.clone();
        self.authenticate(&spec.action, params, &host, spec.signature_version)
            .await
    }

    pub async fn authenticate(
        &mut self,
        operation: &str,
        params: Params,
        domain: &str,
        signature_version: SignatureVersion,
    ) -> SdkResult<Outcome> {
        let modifiers = std::mem::take(&mut self.pending);
        let wants_raw = params.get(RETURN_RAW_KEY).is_some_and(|v| {
            !matches!(v.as_scalar(), Some("") | Some("0") | Some("false"))
        });

        if modifiers.cache.is_some() || modifiers.delete_cache {
            if modifiers.batch {
                return Err(SdkError::config(
                    "Cache and batch modifiers cannot be combined on one call",
                )
                .with_operation(operation));
            }
            if wants_raw {
                return Err(SdkError::config(format!(
                    "{RETURN_RAW_KEY} cannot be used with a cached call"
                ))
                .with_operation(operation));
            }
            return self
                .cached(operation, params, domain, signature_version, &modifiers)
                .await;
        }

        if modifiers.batch || wants_raw {
            let request = self.prepare(operation, params, domain, signature_version)?;
            if modifiers.batch {
                let queue = self.queue.get_or_insert_with(BatchQueue::new);
                let handle = queue.push(request);
                debug!("Queued {operation} at batch index {}", handle.index);
                return Ok(Outcome::Queued(handle));
            }
            return Ok(Outcome::Prepared(request));
        }

        self.fetch(operation, &params, domain, signature_version)
            .await
            .map(Outcome::Response)
    }

    /// Send the active batch. With `clear` the queue is dropped afterwards.
    pub async fn send_batch(&mut self, clear: bool) -> SdkResult<Vec<ResponseEnvelope>> {
        let modifiers = std::mem::take(&mut self.pending);
        if modifiers.cache.is_some() || modifiers.delete_cache {
            return Err(SdkError::config("A batch cannot be sent through the cache"));
        }
        let queue = if clear {
            self.queue.take()
        } else {
            self.queue.clone()
        }
        .ok_or_else(|| SdkError::config("No active batch; call batch() before send_batch()"))?;

        queue.send(self.transport.as_ref()).await
    }

    // ── Pipeline ────────────────────────────────────────────────────────

    /// Strip control keys, sign and assemble the request.
    fn prepare(
        &self,
        operation: &str,
        mut params: Params,
        domain: &str,
        signature_version: SignatureVersion,
    ) -> SdkResult<PreparedRequest> {
        let (overrides, _) = params.take_controls();
        let host_header = self.config.host_header(domain);
        let url = format!("{}/", self.config.endpoint(domain));
        let ctx = (self.clock)();

        let payload = self
            .signer
            .sign(
                signature_version,
                operation,
                &self.service.api_version,
                &host_header,
                "/",
                params.flatten(),
                &ctx,
            )
            .map_err(|e| e.with_operation(operation))?;

        let mut request = PreparedRequest::post(&url, payload.body);
        request.headers = payload.headers;
        request.headers.extend(overrides.headers);
        request.timeout = overrides.timeout;
        Ok(request)
    }

    /// Sign and send, retrying 500/503. Each attempt is signed afresh.
    async fn fetch(
        &self,
        operation: &str,
        params: &Params,
        domain: &str,
        signature_version: SignatureVersion,
    ) -> SdkResult<ResponseEnvelope> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let request = self.prepare(operation, params.clone(), domain, signature_version)?;
            let response = self
                .transport
                .send(&request)
                .await
                .map_err(|e| e.with_operation(operation))?;

            if matches!(response.status, 500 | 503) && attempt < max_retries {
                let delay = backoff(self.config.retry_base_delay(), attempt);
                warn!(
                    "{} {operation} returned {} (attempt {}/{}) - retrying in {}ms",
                    self.service.name,
                    response.status,
                    attempt + 1,
                    max_retries + 1,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            debug!(
                "{} {operation} completed with status {}",
                self.service.name, response.status
            );
            return Ok(ResponseEnvelope::from_http(response));
        }
    }

    async fn cached(
        &self,
        operation: &str,
        params: Params,
        domain: &str,
        signature_version: SignatureVersion,
        modifiers: &Modifiers,
    ) -> SdkResult<Outcome> {
        let backend = self.cache.as_ref().ok_or_else(|| {
            SdkError::config("Cache requested but no cache location is configured")
                .with_operation(operation)
        })?;

        let key = self.cache_key(operation, &params, domain, signature_version);
        let expires = modifiers.cache.map(CacheExpiry::as_secs).unwrap_or(0);
        let store = backend.open(&key, expires, self.config.cache_compress);

        if modifiers.delete_cache {
            let deleted = store.delete().await;
            debug!("Deleted cache entry for {operation}: {deleted}");
            return Ok(Outcome::CacheDeleted(deleted));
        }

        let mut manager = CacheManager::new(store.as_ref());
        if let Some(ref policy) = self.lock {
            manager = manager.with_lock(policy.clone());
        }

        let mut fault: Option<SdkError> = None;
        let fault_slot = &mut fault;
        let this = self;
        let value = manager
            .response_manager(move || async move {
                match this.fetch(operation, &params, domain, signature_version).await {
                    Ok(response) => match serde_json::to_value(&response) {
                        Ok(v) => Some(v),
                        Err(e) => {
                            warn!("Could not serialize {operation} response for caching: {e}");
                            None
                        }
                    },
                    Err(e) => {
                        *fault_slot = Some(e);
                        None
                    }
                }
            })
            .await;

        match value {
            Some(v) => serde_json::from_value(v).map(Outcome::Response).map_err(|e| {
                SdkError::new(
                    SdkErrorKind::Cache,
                    format!("Cached entry is not a response: {e}"),
                )
                .with_operation(operation)
            }),
            None => Err(fault.unwrap_or_else(|| {
                SdkError::new(SdkErrorKind::Cache, "No cached or fresh response available")
                    .with_operation(operation)
            })),
        }
    }

    /// Stable identity for (credentials, call-site, operation, arguments).
    fn cache_key(
        &self,
        operation: &str,
        params: &Params,
        domain: &str,
        signature_version: SignatureVersion,
    ) -> String {
        let identity = serde_json::json!([
            self.config.credentials.key,
            self.service.name,
            operation,
            params,
            domain,
            signature_version.as_u8(),
        ]);
        sha256_hex(&identity.to_string())
    }
}

/// `4^attempt × base`, saturating.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(4u32.saturating_pow(attempt))
        .unwrap_or(Duration::MAX)
}
