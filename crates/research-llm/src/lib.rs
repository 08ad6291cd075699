//! LLM provider abstraction for the company research pipeline
//!
//! This crate provides:
//!
//! - Completion requests and responses
//! - The [`LLMProvider`] trait
//! - [`complete_json`] for structured output with one bounded parse retry
//! - A Gemini provider (behind the `gemini` feature)

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod structured;

// Re-export main types
pub use error::{LLMError, Result};
pub use request::{CompletionRequest, Message, ResponseFormat, Role};
pub use response::{CompletionResponse, StopReason, TokenUsage};
pub use provider::LLMProvider;
pub use structured::{complete_json, extract_json};

// Provider implementations (feature-gated)
#[cfg(feature = "gemini")]
pub mod providers;
