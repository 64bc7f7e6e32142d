//! Configuration system for rewind.
//!
//! Every component takes its configuration explicitly in its constructor;
//! nothing reads process-wide state after startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RewindError, RewindResult};

/// Retry policy for throttled store calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0_f32,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Main rewind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Namespace of the versioned store that receives the version log.
    pub bucket: String,
    /// Path to the versioned store database.
    pub versioned_db_path: PathBuf,
    /// Path to the live parameter store database.
    pub live_db_path: PathBuf,
    /// Keys fetched, resolved and restored concurrently.
    pub max_concurrency: usize,
    /// Page size for listing calls.
    pub page_size: usize,
    /// Abandon a batch after this many seconds and return what finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout_secs: Option<u64>,
    /// Backoff for throttled store calls.
    pub retry: RetryPolicy,
}

impl Default for RewindConfig {
    fn default() -> Self {
        let rewind_dir = dirs::home_dir()
            .map(|h| h.join(".rewind"))
            .unwrap_or_else(|| PathBuf::from(".rewind"));

        Self {
            bucket: "rewind".to_string(),
            versioned_db_path: rewind_dir.join("versions.db"),
            live_db_path: rewind_dir.join("parameters.db"),
            max_concurrency: 8,
            page_size: 1000,
            batch_timeout_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl RewindConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> RewindResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| RewindError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| RewindError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| RewindError::Configuration(e.to_string()))?,
            _ => {
                return Err(RewindError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `REWIND_BUCKET`
    /// - `REWIND_VERSIONED_DB_PATH`
    /// - `REWIND_LIVE_DB_PATH`
    /// - `REWIND_MAX_CONCURRENCY`
    /// - `REWIND_PAGE_SIZE`
    /// - `REWIND_BATCH_TIMEOUT_SECS`
    /// - `REWIND_MAX_RETRIES`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bucket) = std::env::var("REWIND_BUCKET") {
            config.bucket = bucket;
        }
        if let Ok(path) = std::env::var("REWIND_VERSIONED_DB_PATH") {
            config.versioned_db_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("REWIND_LIVE_DB_PATH") {
            config.live_db_path = PathBuf::from(path);
        }
        if let Some(n) = env_parse("REWIND_MAX_CONCURRENCY") {
            config.max_concurrency = n;
        }
        if let Some(n) = env_parse("REWIND_PAGE_SIZE") {
            config.page_size = n;
        }
        if let Some(secs) = env_parse("REWIND_BATCH_TIMEOUT_SECS") {
            config.batch_timeout_secs = Some(secs);
        }
        if let Some(n) = env_parse("REWIND_MAX_RETRIES") {
            config.retry.max_retries = n;
        }

        config
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> RewindResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(RewindError::Configuration("bucket must not be empty".into()));
        }
        if self.max_concurrency == 0 {
            return Err(RewindError::Configuration(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(RewindError::Configuration(
                "page_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> RewindConfigBuilder {
        RewindConfigBuilder::default()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", name, raw);
            None
        }
    }
}

/// Builder for RewindConfig.
#[derive(Default)]
pub struct RewindConfigBuilder {
    config: RewindConfig,
}

impl RewindConfigBuilder {
    /// Set the versioned store namespace.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    /// Set the versioned store database path.
    pub fn versioned_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.versioned_db_path = path.into();
        self
    }

    /// Set the live store database path.
    pub fn live_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.live_db_path = path.into();
        self
    }

    /// Set the per-batch worker count.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    /// Set the listing page size.
    pub fn page_size(mut self, n: usize) -> Self {
        self.config.page_size = n;
        self
    }

    /// Set the batch timeout.
    pub fn batch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.batch_timeout_secs = Some(secs);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> RewindResult<RewindConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
