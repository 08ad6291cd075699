//! Error types for external data sources

use research_resilience::{ResilienceError, Retryable};
use thiserror::Error;

/// Errors raised by the SEC, search and page clients
#[derive(Debug, Error)]
pub enum SourceError {
    /// Non-success HTTP status
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload parsed but did not have the expected shape
    #[error("Unexpected response from {service}: {message}")]
    UnexpectedResponse { service: String, message: String },

    /// A client was constructed without a required key
    #[error("Missing API key for {0}")]
    MissingApiKey(String),

    /// Cache or limiter setup failed
    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),
}

/// Result type alias for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

impl SourceError {
    pub(crate) fn status(service: &str, status: reqwest::StatusCode, message: String) -> Self {
        SourceError::Status {
            service: service.to_string(),
            status: status.as_u16(),
            message,
        }
    }

    pub(crate) fn unexpected(service: &str, message: impl Into<String>) -> Self {
        SourceError::UnexpectedResponse {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Convert SourceError to research_core::Error
impl From<SourceError> for research_core::Error {
    fn from(err: SourceError) -> Self {
        research_core::Error::Source(err.to_string())
    }
}
