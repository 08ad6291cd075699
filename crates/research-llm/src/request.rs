//! What the stages send to a model

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Shape of the response body the provider should produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A single completion call
///
/// Requests are assembled by chaining on [`CompletionRequest::new`]:
///
/// ```
/// use research_llm::{CompletionRequest, ResponseFormat};
///
/// let request = CompletionRequest::new("gemini-2.5-flash")
///     .system("You validate company matches")
///     .user("Is Apple Inc. the company the user meant?")
///     .temperature(0.1)
///     .max_tokens(3000)
///     .json();
///
/// assert_eq!(request.format, ResponseFormat::Json);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: usize,
    /// Provider default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub format: ResponseFormat,
}

impl CompletionRequest {
    const DEFAULT_MAX_TOKENS: usize = 1024;

    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: None,
            format: ResponseFormat::Text,
        }
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }

    pub fn user(self, text: impl Into<String>) -> Self {
        self.turn(Role::User, text)
    }

    /// Append an earlier model answer, e.g. for a follow-up question
    pub fn model_turn(self, text: impl Into<String>) -> Self {
        self.turn(Role::Model, text)
    }

    fn turn(mut self, role: Role, text: impl Into<String>) -> Self {
        self.messages.push(Message {
            role,
            content: text.into(),
        });
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Ask for a JSON body
    pub fn json(mut self) -> Self {
        self.format = ResponseFormat::Json;
        self
    }

    /// Text of the first user turn
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map_or("", |m| m.content.as_str())
    }
}
