//! Resilient request execution for the Trellis project-management API.
//!
//! [`Client`] routes every call through a shared token-bucket
//! [`RateLimiter`], an optional circuit breaker and bulkhead, a
//! method-aware retry policy and, for GETs, an ETag conditional cache.
//! Collections are walked by following the server's `Link` continuations.
//!
//! # Example
//!
//! ```no_run
//! use trellis_client::{CancellationToken, Client, ClientConfig, StaticToken};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?.with_cache_enabled(true);
//! let client = Client::new(config, StaticToken::new("access-token"))?;
//! let account = client.for_account("999999")?;
//!
//! let cancel = CancellationToken::new();
//! let projects = account.get_all("/projects.json", &cancel).await?;
//! println!("{} projects", projects.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod client;
mod config;
mod credentials;
mod hooks;
mod pagination;
mod response;
mod retry;
mod security;
pub mod telemetry;
mod transport;

pub use classify::{Outcome, classify, extract_error_message};
pub use client::{AccountClient, Client, ClientBuilder, circuit_scope};
pub use config::{ClientConfig, ClientConfigBuilder, HttpOptions, default_user_agent};
pub use credentials::{CredentialProvider, RefreshableToken, StaticToken};
pub use hooks::{NoopHooks, RequestHooks, RequestInfo, RequestResult, TracingHooks};
pub use pagination::{
    ListMeta, PageBounds, PageLimit, PageSource, follow_pagination, is_same_origin,
    parse_next_link, resolve_url,
};
pub use response::{Response, TOTAL_COUNT};
pub use retry::{Backoff, MethodSafety, RefreshState, is_refreshed_auth};
pub use security::{is_localhost, is_secure_endpoint, redact_headers, sensitive_headers};
pub use transport::{
    HttpTransport, MAX_ERROR_BODY_BYTES, MAX_RESPONSE_BODY_BYTES, ReqwestTransport,
    TransportRequest, TransportResponse,
};

pub use tokio_util::sync::CancellationToken;
pub use trellis_cache::{CacheKey, FileSystemCache, MemoryCache, ResponseCache};
pub use trellis_error::{
    ApiError, ApiErrorKind, ErrorCode, ResilienceError, ResilienceErrorKind, RetryableError,
    TrellisError, TrellisErrorKind, TrellisResult,
};
pub use trellis_rate_limit::{
    BulkheadConfig, CircuitBreakerConfig, CircuitState, Clock, ManualClock, RateLimitConfig,
    RateLimiter, Reservation, SystemClock,
};
