//! # cloudfusion – AWS query-protocol request runtime
//!
//! Signs operation calls with Signature Version 2 or 3, sends them with
//! retry on 500/503, and optionally routes them through a read-through
//! response cache ([`cloudfusion_cache`]) or a concurrent batch queue.
//!
//! ```text
//! Runtime::call / authenticate   (runtime.rs)
//!   ├── cache(expiry)  → CacheManager → fetch on miss / stale
//!   ├── batch()        → BatchQueue   → send_multi (rolling window)
//!   ├── returnRawRequest → PreparedRequest
//!   └── fetch          → RequestSigner → Transport (+ retry)
//!                                          └── ResponseEnvelope (xml.rs)
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod expiry;
pub mod params;
pub mod registry;
pub mod response;
pub mod runtime;
pub mod signing;
pub mod transport;
pub mod util;
pub mod xml;

pub use batch::{BatchHandle, BatchQueue};
pub use config::{Credentials, RuntimeConfig};
pub use error::{SdkError, SdkErrorKind, SdkResult};
pub use expiry::CacheExpiry;
pub use params::{ParamValue, Params, TransportOptions};
pub use registry::{OperationRegistry, OperationSpec, ServiceDescriptor};
pub use response::{ResponseBody, ResponseEnvelope};
pub use runtime::{Outcome, Runtime, SigningClock};
pub use signing::{RequestSigner, SignatureVersion, SigningContext};
pub use transport::{send_multi, HttpResponse, HttpTransport, PreparedRequest, Transport};
pub use xml::XmlElement;

pub use cloudfusion_cache::{CacheSelector, LockPolicy, ServerAddr};
