//! Google Gemini provider implementation
//!
//! Implements the LLMProvider trait over the Gemini REST `generateContent`
//! endpoint. See: https://ai.google.dev/api/generate-content

use crate::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider, ResponseFormat, Result, Role,
    StopReason, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TOP_P: f32 = 0.95;
const DEFAULT_TOP_K: u32 = 40;

/// Gemini provider
///
/// Works with any `generateContent` model, e.g.:
/// - gemini-2.5-pro
/// - gemini-2.5-flash
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    ///
    /// # Arguments
    ///
    /// * `api_key` - Google AI API key
    /// * `timeout` - Per-request timeout
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Create a provider from environment variable
    ///
    /// Reads the API key from the `GOOGLE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("GOOGLE_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key, Duration::from_secs(120))
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to Gemini API");

        let model = request.model.clone();
        let body = GeminiRequest::from(request);

        let response = self
            .client
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed,
                429 => LLMError::RateLimitExceeded(error_text),
                400 => LLMError::InvalidRequest(error_text),
                404 => LLMError::ModelNotFound(model),
                code @ 500..=599 => LLMError::ServerError {
                    status: code,
                    body: error_text,
                },
                _ => LLMError::RequestFailed(format!("HTTP {status}: {error_text}")),
            });
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
        })?;

        let completion = gemini_response.into_completion()?;
        debug!(
            "Received response - stop_reason: {:?}, tokens: {}/{}",
            completion.stop_reason, completion.usage.input_tokens, completion.usage.output_tokens
        );
        Ok(completion)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// Gemini-specific request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

impl From<CompletionRequest> for GeminiRequest {
    fn from(request: CompletionRequest) -> Self {
        let contents = request
            .messages
            .into_iter()
            .map(|message| Content {
                role: Some(
                    match message.role {
                        Role::User => "user",
                        Role::Model => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: message.content,
                }],
            })
            .collect();

        Self {
            contents,
            system_instruction: request.system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                top_p: DEFAULT_TOP_P,
                top_k: DEFAULT_TOP_K,
                response_mime_type: match request.format {
                    ResponseFormat::Json => Some("application/json"),
                    ResponseFormat::Text => None,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

impl GeminiResponse {
    fn into_completion(self) -> Result<CompletionResponse> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("response has no candidates".to_string()))?;

        let stop_reason = match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") => {
                StopReason::ContentFiltered
            }
            Some("STOP") | None => StopReason::EndTurn,
            Some(other) => {
                debug!("Unknown finish reason: {}", other);
                StopReason::EndTurn
            }
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LLMError::UnexpectedResponse(format!(
                "empty response (stop reason {stop_reason:?})"
            )));
        }

        let usage = self
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            stop_reason,
            usage,
        })
    }
}
