//! Client-side admission control and back-pressure.
//!
//! This crate provides the gates every outbound request passes before it
//! reaches the transport:
//!
//! - [`RateLimiter`] - a token bucket shared by all requests of one client,
//!   with a client-wide slow-down window armed by `429 Retry-After` responses
//! - [`CircuitBreakerRegistry`] - per-scope breakers that stop calling a
//!   failing endpoint for a while
//! - [`Bulkhead`] - a cap on concurrent in-flight calls
//!
//! Every gate that suspends the caller observes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) and returns a
//! cancellation error as soon as it fires.
//!
//! Time is read through the [`Clock`] trait so tests can drive it with
//! [`ManualClock`].

mod bulkhead;
mod circuit_breaker;
mod clock;
mod config;
mod limiter;
mod retry_after;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BulkheadConfig, CircuitBreakerConfig, RateLimitConfig};
pub use limiter::{RateLimiter, Reservation};
pub use retry_after::{RETRY_AFTER, parse_retry_after, parse_retry_after_value};
