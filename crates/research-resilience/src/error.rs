//! Error types for resilience primitives

use thiserror::Error;

/// Result type for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Errors raised when constructing or using resilience primitives
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// Retry parameters out of range
    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// Rate limit parameters out of range
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// A fallback chain was run without any strategy registered
    #[error("Fallback chain '{0}' has no strategies configured")]
    NoStrategies(String),

    /// Cache file could not be written
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache value could not be encoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for ResilienceError {
    fn from(err: bincode::Error) -> Self {
        ResilienceError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(err: serde_json::Error) -> Self {
        ResilienceError::Serialization(err.to_string())
    }
}
