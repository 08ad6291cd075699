//! Error types for research-core

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type raised by pipeline stages
///
/// Only errors a stage cannot recover from are represented here. Recoverable
/// conditions are recorded in `ResearchState::error_message` instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The human selection does not identify a candidate
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Required configuration or input data is missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage ran without the data it requires
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An external data source failed
    #[error("Source error: {0}")]
    Source(String),

    /// The language model call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Structured output could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error message
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
