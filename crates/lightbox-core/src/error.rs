use thiserror::Error;

/// Application-wide error types for Lightbox.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (building or sending a request).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The tweet lookup API answered with a non-success status.
    #[error("API error (HTTP {status_code}): {message}")]
    ApiError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Request timed out.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A response or attribute could not be parsed into the expected shape.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A CSS selector could not be parsed.
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    /// Invalid or missing configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// `extract` was called on an orchestrator without any strategy.
    #[error("No extraction strategy configured")]
    ChainNotConfigured,

    /// A strategy panicked while extracting.
    #[error("Strategy '{0}' panicked")]
    StrategyPanicked(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::ApiError { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
