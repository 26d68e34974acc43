//! Configuration management for chainetl

use crate::error::{EtlError, Result};
use crate::pagination::TxCountCheck;
use crate::retry::{Backoff, RetryPolicy};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "chainetl.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let backoff = Backoff::exponential(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
        .with_jitter(self.jitter);
        RetryPolicy::new(self.max_attempts, backoff)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationConfig {
    /// Fail instead of warn when a block's pages don't add up to `tx_count`.
    #[serde(default)]
    pub strict_tx_count: bool,
}

impl PaginationConfig {
    pub fn tx_count_check(&self) -> TxCountCheck {
        if self.strict_tx_count {
            TxCountCheck::Strict
        } else {
            TxCountCheck::Warn
        }
    }
}

fn default_base_url() -> String {
    "http://umbrel.local:3006/api/".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_db_path() -> String {
    "bitcoin_etl.db".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

/// Loads the configuration at `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let config_str = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        parse_config(&config_str)?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    toml::from_str(config_str).map_err(|e| EtlError::Config(e.to_string()))
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(EtlError::Config("database.path must be set".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(EtlError::Config("retry.max_attempts must be at least 1".into()));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(EtlError::Config(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(EtlError::Config("api.timeout_secs must be positive".into()));
        }

        crate::endpoint::ApiBase::parse(&self.api.base_url)?;
        Ok(())
    }
}
