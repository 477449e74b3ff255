//! Model capability trait and request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::LlmError;

/// Author of a chat message as seen by the model API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One chat-completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Sequences at which the model stops generating.
    pub stop: Vec<String>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            stop: Vec::new(),
            temperature: 0.0,
        }
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Model output for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Provider-side request id, logged for correlation.
    pub request_id: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            request_id: None,
        }
    }
}

/// A chat model that turns a message list into a completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    /// Complete while forwarding text fragments to `sink` as they arrive.
    ///
    /// The returned completion always carries the full text. The default
    /// implementation sends the whole completion as a single fragment.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        sink: UnboundedSender<String>,
    ) -> Result<Completion, LlmError> {
        let completion = self.complete(request).await?;
        if !completion.text.is_empty() {
            let _ = sink.send(completion.text.clone());
        }
        Ok(completion)
    }

    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;
}
