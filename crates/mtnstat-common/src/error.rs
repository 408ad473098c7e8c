use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MtnError>;

/// Error kinds for the scraping engine, per the error taxonomy.
#[derive(Debug, Error)]
pub enum MtnError {
    #[error("no configuration for mountain '{0}'")]
    ConfigMissing(String),

    #[error("unsupported strategy: {0}")]
    StrategyUnsupported(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("request timed out")]
    Timeout,

    #[error("upstream error (status {status}): {message}")]
    UpstreamError { status: u16, message: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("headless engine failed to start: {0}")]
    HeadlessInitFailed(String),

    #[error("duplicate record for ({mountain_id}, {scraped_at})")]
    StorageDuplicate {
        mountain_id: String,
        scraped_at: String,
    },

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    ConfigError(String),
}

impl MtnError {
    /// The taxonomy kind name, stable across Display formatting changes.
    pub fn kind(&self) -> &'static str {
        match self {
            MtnError::ConfigMissing(_) => "config_missing",
            MtnError::StrategyUnsupported(_) => "strategy_unsupported",
            MtnError::NetworkError(_) => "network_error",
            MtnError::Timeout => "timeout",
            MtnError::UpstreamError { .. } => "upstream_error",
            MtnError::ParseError(_) => "parse_error",
            MtnError::HeadlessInitFailed(_) => "headless_init_failed",
            MtnError::StorageDuplicate { .. } => "storage_duplicate",
            MtnError::StorageFailure(_) => "storage_failure",
            MtnError::Cancelled => "cancelled",
            MtnError::ConfigError(_) => "config_error",
        }
    }

    /// True for errors the orchestrator swallows rather than counts as failures.
    pub fn is_swallowed(&self) -> bool {
        matches!(self, MtnError::StorageDuplicate { .. })
    }
}

impl From<reqwest::Error> for MtnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MtnError::Timeout
        } else if let Some(status) = err.status() {
            MtnError::UpstreamError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            MtnError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MtnError {
    fn from(err: serde_json::Error) -> Self {
        MtnError::ParseError(err.to_string())
    }
}

impl From<sqlx::Error> for MtnError {
    fn from(err: sqlx::Error) -> Self {
        MtnError::StorageFailure(err.to_string())
    }
}
