//! Tracing subscriber setup for applications built on the client.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use trellis_error::ConfigError;

const DEFAULT_FILTER: &str = "info,trellis_client=debug";

/// Install a console subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info` globally and `debug` for this crate when
/// `RUST_LOG` is unset or invalid.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), ConfigError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| ConfigError::new(format!("Failed to initialize tracing: {}", e)))?;

    tracing::debug!("Tracing initialized");
    Ok(())
}

/// Like [`init_tracing`], but emits one JSON object per event.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_json_tracing() -> Result<(), ConfigError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ConfigError::new(format!("Failed to initialize tracing: {}", e)))
}
