//! Error types for chainetl

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// The explorer answered, but the body is malformed or incomplete.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeout, connection failure, 5xx, 408 or 429. Safe to retry.
    #[error("Transient network error for {url}: {reason}")]
    TransientNetwork { url: String, reason: String },

    /// Any other 4xx. Retrying will not help.
    #[error("Permanent network error for {url}: HTTP {status}")]
    PermanentNetwork { url: String, status: u16 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Whether the retry policy is allowed to try the failed call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, EtlError::TransientNetwork { .. })
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EtlError::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        EtlError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::Validation(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, EtlError>;
