//! Tests for configuration files.

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use trellis_client::{Client, ClientConfig, StaticToken};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_overrides_defaults() -> anyhow::Result<()> {
    let file = write_config(
        r#"
base_url = "https://api.example.com"
account_id = "99"
cache_enabled = true

[http]
max_retries = 3
base_delay_ms = 250

[rate_limit]
requests_per_second = 5.5
burst_size = 4

[circuit_breaker]
failure_threshold = 3
"#,
    );

    let config = ClientConfig::from_file(file.path())?;

    assert_eq!(config.base_url(), "https://api.example.com");
    assert_eq!(config.account_id().as_deref(), Some("99"));
    assert!(*config.cache_enabled());
    assert_eq!(config.http().max_retries, 3);
    assert_eq!(config.http().base_delay(), Duration::from_millis(250));
    // Untouched keys keep their defaults
    assert_eq!(config.http().max_pages, 10_000);
    assert_eq!(config.rate_limit().requests_per_second, 5.5);
    assert_eq!(config.rate_limit().burst_size, 4);
    assert!(config.rate_limit().respect_retry_after);

    let breaker = config.circuit_breaker().as_ref().unwrap();
    assert_eq!(breaker.failure_threshold, 3);
    assert_eq!(breaker.success_threshold, 2);
    assert!(config.bulkhead().is_none());
    Ok(())
}

#[test]
fn test_insecure_base_url_is_rejected() {
    let file = write_config(r#"base_url = "http://api.example.com""#);
    let err = ClientConfig::from_file(file.path()).unwrap_err();
    assert_eq!(err.key.as_deref(), Some("base_url"));
}

#[test]
fn test_zero_burst_is_rejected() {
    let file = write_config("[rate_limit]\nburst_size = 0\n");
    assert!(ClientConfig::from_file(file.path()).is_err());
}

#[test]
fn test_malformed_file_is_rejected() {
    let file = write_config("[http\nmax_retries = ");
    let err = ClientConfig::from_file(file.path()).unwrap_err();
    assert!(err.message.contains("Failed to build configuration"));
}

#[test]
fn test_missing_file_is_rejected() {
    assert!(ClientConfig::from_file("/nonexistent/trellis.toml").is_err());
}

#[test]
fn test_layered_load_succeeds() {
    let config = ClientConfig::load().unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn test_enabled_cache_creates_directory() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let dir = temp_dir.path().join("responses-cache");
    let config = ClientConfig::default()
        .with_cache_enabled(true)
        .with_cache_dir(dir.clone());

    let client = Client::new(config, StaticToken::new("token")).unwrap();

    assert!(client.cache().is_some());
    assert!(dir.is_dir());
}
