//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration consumed by the batch runner, including the retry
//! schedule, output destinations and the Chrome/Lighthouse launch settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::AuditError;

/// Default location of the persisted report.
pub const DEFAULT_OUTPUT_FILE: &str = "./output/results.json";

/// URL audited when `--example` is passed.
pub const EXAMPLE_URL: &str = "https://example.com";

/// Main configuration structure for a batch run
///
/// Every setting the core needs is passed explicitly through this struct; nothing is read
/// from process-wide state.
///
/// # Examples
///
/// ```rust
/// use lighthouse_batch::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     retries: 1,
///     concurrency: 2,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of retries after a failed audit attempt (default: 3)
    ///
    /// Each URL gets at most `retries + 1` attempts before it is dropped from the report.
    pub retries: usize,

    /// Delay between attempts (default: 1 second)
    pub retry_delay: Duration,

    /// Multiplier applied to `retry_delay` after each retry (default: 1.0, fixed delay)
    pub backoff_multiplier: f64,

    /// Upper bound for the delay between attempts (default: 30 seconds)
    pub max_retry_delay: Duration,

    /// Timeout for a single Lighthouse run (default: 120 seconds)
    ///
    /// A run exceeding this is treated as a failed attempt and retried.
    pub attempt_timeout: Duration,

    /// Number of URLs audited at once (default: 1)
    ///
    /// Each in-flight URL owns its own Chrome process, so this also bounds how many browsers
    /// run at the same time. Results always keep the input order.
    pub concurrency: usize,

    /// Report destination (default: ./output/results.json)
    pub output_file: PathBuf,

    /// Endpoint the report is POSTed to after the batch (default: none)
    pub remote_endpoint: Option<String>,

    /// File receiving the Prometheus text exposition after the batch (default: none)
    pub metrics_file: Option<PathBuf>,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Extra command-line flags for Chrome
    pub chrome_flags: Vec<String>,

    /// Lighthouse executable (default: `lighthouse` from PATH)
    pub lighthouse_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.0,
            max_retry_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(120),
            concurrency: 1,
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            remote_endpoint: None,
            metrics_file: None,
            chrome_path: None,
            chrome_flags: Vec::new(),
            lighthouse_path: "lighthouse".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.concurrency == 0 {
            return Err(AuditError::Configuration(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.attempt_timeout.is_zero() {
            return Err(AuditError::Configuration(
                "Attempt timeout must be greater than 0".to_string(),
            ));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(AuditError::Configuration(format!(
                "Backoff multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        if self.lighthouse_path.trim().is_empty() {
            return Err(AuditError::Configuration(
                "Lighthouse path must not be empty".to_string(),
            ));
        }

        if let Some(endpoint) = &self.remote_endpoint {
            crate::validate_url(endpoint).map_err(|_| {
                AuditError::Configuration(format!("Invalid remote endpoint '{endpoint}'"))
            })?;
        }

        Ok(())
    }
}

/// Generate Chrome command-line arguments for an audit session
///
/// # Examples
///
/// ```rust
/// use lighthouse_batch::{Config, get_chrome_args};
///
/// let config = Config::default();
/// let args = get_chrome_args(&config);
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
    ];

    args.extend(config.chrome_flags.iter().cloned());
    args
}

/// Profile directory used by the Chrome session `session_id`.
pub fn session_profile_dir(session_id: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "lighthouse-batch-{}-{}",
        std::process::id(),
        session_id
    ))
}

/// Build the chromiumoxide launch config for the session `session_id`
///
/// Every session gets its own profile directory, and Chrome picks a free debugging port
/// which Lighthouse later connects to.
pub fn create_browser_config(
    config: &Config,
    session_id: &str,
) -> Result<chromiumoxide::browser::BrowserConfig, AuditError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .args(get_chrome_args(config))
        .user_data_dir(session_profile_dir(session_id));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(AuditError::BrowserLaunchFailed)
}
