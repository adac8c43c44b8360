//! Unified error types for RepoWatch.

use thiserror::Error;

use crate::types::RateLimit;

/// Result type alias using RepoWatchError.
pub type Result<T> = std::result::Result<T, RepoWatchError>;

#[derive(Error, Debug)]
pub enum RepoWatchError {
    // Pipeline errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Cron error: {0}")]
    Cron(String),

    // Management errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Monitor not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl RepoWatchError {
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Failure reported by an event source.
///
/// Transient failures (timeouts, 5xx, rate limiting) and permanent ones
/// (bad credentials, missing repository) are both retried on the monitor's
/// normal schedule; the distinction only shows up in the execution history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("transient: {message}")]
    Transient {
        message: String,
        /// Quota metadata, when the failed response carried it.
        rate_limit: Option<RateLimit>,
    },

    #[error("permanent: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient {
            message: msg.into(),
            rate_limit: None,
        }
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match self {
            Self::Transient { rate_limit, .. } => rate_limit.as_ref(),
            Self::Permanent(_) => None,
        }
    }
}
