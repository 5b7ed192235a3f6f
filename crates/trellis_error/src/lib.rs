//! Error types for the Trellis API client.
//!
//! This crate provides the foundation error types used throughout the Trellis workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! Server-facing failures are [`ApiError`]s, which additionally carry the HTTP
//! status, a retryable flag and an optional server-specified wait. Cancellation
//! of a suspension point is always a [`ResilienceError`], never an `ApiError`.
//!
//! # Examples
//!
//! ```
//! use trellis_error::{ApiError, ApiErrorKind, TrellisResult};
//!
//! fn fetch_project() -> TrellisResult<String> {
//!     Err(ApiError::new(ApiErrorKind::NotFound("project 42".into())))?
//! }
//!
//! match fetch_project() {
//!     Ok(body) => println!("Got: {}", body),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod cache;
mod code;
mod config;
mod error;
mod http;
mod json;
mod resilience;
mod retryable;

pub use api::{ApiError, ApiErrorKind, MAX_ERROR_MESSAGE_BYTES, truncate_message};
pub use cache::{CacheError, CacheErrorKind};
pub use code::{ErrorCode, ExitCode};
pub use config::ConfigError;
pub use error::{TrellisError, TrellisErrorKind, TrellisResult};
pub use http::HttpError;
pub use json::JsonError;
pub use resilience::{ResilienceError, ResilienceErrorKind};
pub use retryable::RetryableError;
