//! Executor configuration
//!
//! Settings can be layered with the following priority:
//!
//! ```text
//! Priority (high → low):
//! 1. Values set in code
//! 2. Environment variables (FLOWGRAPH_WORKERS, FLOWGRAPH_IDLE_TIMEOUT_MS)
//! 3. Configuration file (TOML)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use flowgraph::util::config::ExecutorConfig;
//!
//! let config = ExecutorConfig::from_toml_str("num_workers = 2").unwrap();
//! assert_eq!(config.num_workers, 2);
//! ```

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`ExecutorConfig::num_workers`].
pub const ENV_WORKERS: &str = "FLOWGRAPH_WORKERS";

/// Environment variable overriding [`ExecutorConfig::idle_timeout_ms`].
pub const ENV_IDLE_TIMEOUT_MS: &str = "FLOWGRAPH_IDLE_TIMEOUT_MS";

/// Settings of an [`Executor`](crate::Executor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker threads
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Longest time an idle worker parks before looking for work again
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Stack size of worker threads; the platform default if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
    /// Prefix of worker thread names
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_num_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_idle_timeout_ms() -> u64 {
    5
}

fn default_thread_name() -> String {
    "flowgraph-worker".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            idle_timeout_ms: default_idle_timeout_ms(),
            stack_size: None,
            thread_name: default_thread_name(),
        }
    }
}

impl ExecutorConfig {
    /// Default settings with a given number of workers.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    /// Idle timeout as a duration.
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Parse a configuration from TOML; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Write the configuration as TOML.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlay the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values provided by `lookup`, keyed by environment variable name.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_WORKERS) {
            self.num_workers = parse_env(ENV_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_IDLE_TIMEOUT_MS) {
            self.idle_timeout_ms = parse_env(ENV_IDLE_TIMEOUT_MS, &value)?;
        }
        Ok(self)
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            key,
            value: value.to_string(),
        })
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value `{value}` for {key}")]
    InvalidEnv { key: &'static str, value: String },
}
