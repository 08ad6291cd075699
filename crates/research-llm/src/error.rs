//! Error types for LLM operations

use research_resilience::Retryable;
use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Failures of a completion call
///
/// [`Retryable`] separates transient failures from permanent ones.
#[derive(Error, Debug)]
pub enum LLMError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication rejected by the provider")]
    AuthenticationFailed,

    #[error("rate limited: {0}")]
    RateLimitExceeded(String),

    #[error("request rejected: {0}")]
    InvalidRequest(String),

    #[error("unknown model '{0}'")]
    ModelNotFound(String),

    #[error("provider returned HTTP {status}: {body}")]
    ServerError { status: u16, body: String },

    #[cfg(feature = "gemini")]
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The model answered, but not with the requested structure
    #[error("structured output did not parse: {0}")]
    StructuredOutput(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl Retryable for LLMError {
    fn is_retryable(&self) -> bool {
        match self {
            LLMError::RequestFailed(_)
            | LLMError::RateLimitExceeded(_)
            | LLMError::ServerError { .. } => true,
            #[cfg(feature = "gemini")]
            LLMError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
