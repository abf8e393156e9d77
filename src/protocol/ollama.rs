//! Wire types of the Ollama-shaped API exposed to clients.

use serde::{Deserialize, Serialize};

/// Role stamped on every translated record.
pub const ASSISTANT_ROLE: &str = "assistant";

/// One `{role, content}` pair of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`.
///
/// `model` and `messages` are optional at the serde level so a missing field
/// becomes a 400 from [`ChatRequest::validate`] instead of a generic decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    /// Absent means streaming, as in Ollama.
    #[serde(default)]
    pub stream: Option<bool>,
    /// Sampling options. Accepted and kept opaque; the backend schema has no
    /// equivalent bag, so they are not forwarded.
    #[serde(default)]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A [`ChatRequest`] whose required fields are known to be present.
#[derive(Debug, Clone)]
pub struct ValidChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ChatRequest {
    /// Check required fields and resolve the stream default.
    ///
    /// # Errors
    ///
    /// Returns a message naming the missing field.
    pub fn validate(self) -> Result<ValidChatRequest, String> {
        let model = match self.model {
            Some(model) if !model.trim().is_empty() => model,
            _ => return Err("missing required field 'model'".to_owned()),
        };
        let Some(messages) = self.messages else {
            return Err("missing required field 'messages'".to_owned());
        };
        Ok(ValidChatRequest {
            model,
            messages,
            stream: self.stream.unwrap_or(true),
            options: self.options,
        })
    }
}

/// Message body of a translated record; role is always `assistant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// One line of the NDJSON stream written to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatChunk<'a> {
    pub model: &'a str,
    pub message: AssistantMessage<'a>,
}

/// Non-streaming `/api/chat` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub created_at: String,
    pub message: ChatMessage,
    pub done: bool,
}

/// `details` block of a model descriptor. The backend reports none of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub parent_model: String,
    pub format: String,
    pub family: String,
    pub families: Option<Vec<String>>,
    pub parameter_size: String,
    pub quantization_level: String,
}

/// One entry of `/api/tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub model: String,
    pub modified_at: String,
    pub size: u64,
    pub digest: String,
    pub details: ModelDetails,
}

/// Body of `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsResponse {
    pub models: Vec<ModelDescriptor>,
}

/// Body of `GET /api/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}
