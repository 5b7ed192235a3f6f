//! Client configuration.
//!
//! Settings are loaded with the following precedence (highest first):
//! 1. Environment variables prefixed `TRELLIS_` (`__` separates nested keys)
//! 2. `./trellis.toml` in the current directory
//! 3. `~/.config/trellis/trellis.toml`
//! 4. Bundled defaults shipped with the library
//!
//! The transport, credentials, clock and hooks are not part of the file
//! format; supply them through [`ClientBuilder`](crate::ClientBuilder).

use config::{Config, Environment, File, FileFormat};
use derive_getters::Getters;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};
use trellis_error::ConfigError;
use trellis_rate_limit::{BulkheadConfig, CircuitBreakerConfig, RateLimitConfig};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../trellis.toml");

/// Default `User-Agent` sent with every request.
pub fn default_user_agent() -> String {
    format!("trellis-rs/{}", env!("CARGO_PKG_VERSION"))
}

/// Execution settings for individual calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Per-request transport timeout.
    pub timeout_ms: u64,

    /// Total attempts for idempotent requests, including the first.
    pub max_retries: u32,

    /// Delay before the first retry; doubles each retry.
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay.
    pub max_jitter_ms: u64,

    /// Hard ceiling on pages fetched by one pagination run.
    pub max_pages: usize,

    /// Item cap applied when a caller passes a limit of `0`.
    pub default_list_limit: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 5,
            base_delay_ms: 1_000,
            max_jitter_ms: 100,
            max_pages: 10_000,
            default_list_limit: 100,
        }
    }
}

impl HttpOptions {
    /// Transport timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base backoff delay as a duration.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Jitter bound as a duration.
    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    /// Check the retry and paging bounds.
    ///
    /// # Errors
    ///
    /// Returns an error when a bound is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("http.timeout_ms", "must be positive"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("http.max_retries", "must be at least 1"));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::invalid("http.max_pages", "must be at least 1"));
        }
        Ok(())
    }
}

/// Complete client configuration.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `https://3.basecampapi.com`
    #[setters(into)]
    base_url: String,

    /// Account used by [`Client::for_default_account`](crate::Client::for_default_account)
    #[setters(strip_option, into)]
    account_id: Option<String>,

    /// `User-Agent` header value
    #[setters(into)]
    user_agent: String,

    /// Directory for the durable response cache; defaults to the platform
    /// cache directory
    #[setters(strip_option, into)]
    cache_dir: Option<PathBuf>,

    /// Whether GET responses are cached by ETag
    cache_enabled: bool,

    /// Per-call execution settings
    http: HttpOptions,

    /// Token bucket settings
    rate_limit: RateLimitConfig,

    /// Per-endpoint circuit breaking; disabled when absent
    #[setters(strip_option)]
    circuit_breaker: Option<CircuitBreakerConfig>,

    /// Concurrency cap; disabled when absent
    #[setters(strip_option)]
    bulkhead: Option<BulkheadConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://3.basecampapi.com".to_string(),
            account_id: None,
            user_agent: default_user_agent(),
            cache_dir: None,
            cache_enabled: false,
            http: HttpOptions::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: None,
            bulkhead: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from all layers.
    ///
    /// User config files are optional and silently skipped when missing.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use trellis_client::ClientConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::load()?;
    /// println!("{}", config.base_url());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or the merged
    /// result fails validation.
    #[instrument]
    pub fn load() -> Result<Self, ConfigError> {
        debug!("Loading configuration with precedence: env > current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/trellis/trellis.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder
            .add_source(File::with_name("trellis").required(false))
            .add_source(
                Environment::with_prefix("TRELLIS")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::finish(builder)
    }

    /// Load configuration from one explicit file, on top of the bundled
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or invalid.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()).required(true));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("base_url", format!("not a valid URL: {}", e)))?;
        if !crate::security::is_secure_endpoint(&url) {
            return Err(ConfigError::invalid(
                "base_url",
                format!("must use HTTPS, got {}", self.base_url),
            ));
        }
        if let Some(account_id) = &self.account_id
            && (account_id.is_empty() || account_id.contains('/'))
        {
            return Err(ConfigError::invalid(
                "account_id",
                format!("invalid account id {:?}", account_id),
            ));
        }
        self.http.validate()?;
        self.rate_limit.validate()?;
        if let Some(circuit_breaker) = &self.circuit_breaker {
            circuit_breaker.validate()?;
        }
        if let Some(bulkhead) = &self.bulkhead {
            bulkhead.validate()?;
        }
        Ok(())
    }

    /// Directory the response cache lives in.
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("trellis")
        })
    }
}
