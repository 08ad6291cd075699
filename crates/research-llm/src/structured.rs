//! Structured JSON output
//!
//! Models often wrap JSON in Markdown code fences or add a sentence before
//! it. [`extract_json`] cuts out the outermost object or array, and
//! [`complete_json`] deserializes it, asking the model once more if the
//! first answer does not parse.

use crate::{CompletionRequest, LLMError, LLMProvider, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Number of completions tried before giving up on a parse
const PARSE_ATTEMPTS: u32 = 2;

/// Extract the JSON object or array embedded in a model response
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Run a completion and deserialize its JSON body into `T`
///
/// Provider errors are returned as-is. A response that does not parse is
/// retried once with the same request, after which the parse error is
/// returned as [`LLMError::StructuredOutput`].
pub async fn complete_json<T: DeserializeOwned>(
    provider: &dyn LLMProvider,
    request: CompletionRequest,
) -> Result<T> {
    let mut attempt = 1;
    loop {
        let response = provider.complete(request.clone()).await?;

        let parsed = extract_json(&response.text)
            .ok_or_else(|| "no JSON found in response".to_string())
            .and_then(|json| serde_json::from_str::<T>(json).map_err(|e| e.to_string()));

        match parsed {
            Ok(value) => {
                debug!("Parsed structured output on attempt {}", attempt);
                return Ok(value);
            }
            Err(reason) if attempt < PARSE_ATTEMPTS => {
                warn!(
                    "Structured output from {} did not parse ({}), retrying",
                    provider.name(),
                    reason
                );
                attempt += 1;
            }
            Err(reason) => return Err(LLMError::StructuredOutput(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompletionResponse;
    use async_trait::async_trait;
    use mockall::{Sequence, mock};
    use serde::Deserialize;

    mock! {
        pub Provider {}

        #[async_trait]
        impl LLMProvider for Provider {
            async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
            fn name(&self) -> &str;
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        confidence: String,
        #[serde(rename = "match")]
        is_match: String,
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("gemini-2.5-flash")
            .user("validate")
            .json()
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(
            extract_json("```json\n{\"a\": {\"b\": 2}}\n```"),
            Some(r#"{"a": {"b": 2}}"#)
        );
        assert_eq!(
            extract_json("Here you go: [1, 2, 3]. Done."),
            Some("[1, 2, 3]")
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[tokio::test]
    async fn test_complete_json_first_try() {
        let mut provider = MockProvider::new();
        provider.expect_complete().times(1).returning(|_| {
            Ok(CompletionResponse::from_text(
                "```json\n{\"confidence\": \"HIGH\", \"match\": \"YES\"}\n```",
            ))
        });

        let verdict: Verdict = complete_json(&provider, request()).await.unwrap();
        assert_eq!(
            verdict,
            Verdict {
                confidence: "HIGH".to_string(),
                is_match: "YES".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_complete_json_retries_parse_failure_once() {
        let mut provider = MockProvider::new();
        let mut seq = Sequence::new();
        provider.expect_name().return_const("mock".to_string());
        provider
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CompletionResponse::from_text("I think it is a match.")));
        provider
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(CompletionResponse::from_text(
                    r#"{"confidence": "LOW", "match": "NO"}"#,
                ))
            });

        let verdict: Verdict = complete_json(&provider, request()).await.unwrap();
        assert_eq!(verdict.confidence, "LOW");
    }

    #[tokio::test]
    async fn test_complete_json_gives_up_after_two() {
        let mut provider = MockProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider
            .expect_complete()
            .times(2)
            .returning(|_| Ok(CompletionResponse::from_text(r#"{"confidence": 3}"#)));

        let result = complete_json::<Verdict>(&provider, request()).await;
        assert!(matches!(result, Err(LLMError::StructuredOutput(_))));
    }

    #[tokio::test]
    async fn test_provider_error_not_retried() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_| Err(LLMError::AuthenticationFailed));

        let result = complete_json::<Verdict>(&provider, request()).await;
        assert!(matches!(result, Err(LLMError::AuthenticationFailed)));
    }
}
