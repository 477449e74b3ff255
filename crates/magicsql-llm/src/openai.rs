//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, Azure OpenAI, vLLM, local gateways) via a configurable base URL.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use crate::error::LlmError;
use crate::provider::{ChatModel, Completion, CompletionRequest};

pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model: model.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": stream,
        });
        if !request.stop.is_empty() {
            body["stop"] = json!(request.stop);
        }
        body
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = self.request_body(request, stream);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            stream,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout.as_secs())
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

/// Extract the assistant text and id from a non-streaming response body.
pub fn parse_response(json: &Value) -> Result<Completion, LlmError> {
    if let Some(message) = api_error_message(json) {
        return Err(LlmError::Parse(format!("API error: {}", message)));
    }

    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::Parse("missing choices[0].message.content".to_string()))?;

    Ok(Completion {
        text: text.to_string(),
        request_id: json.get("id").and_then(|v| v.as_str()).map(String::from),
    })
}

/// Parse one SSE `data:` payload. Returns the content delta, if any.
pub fn parse_stream_chunk(data: &str) -> Result<StreamChunk, LlmError> {
    if data.trim() == "[DONE]" {
        return Ok(StreamChunk::Done);
    }

    let json: Value = serde_json::from_str(data)?;
    if let Some(message) = api_error_message(&json) {
        return Err(LlmError::Stream(message));
    }

    Ok(StreamChunk::Delta {
        id: json.get("id").and_then(|v| v.as_str()).map(String::from),
        content: json
            .pointer("/choices/0/delta/content")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum StreamChunk {
    Delta {
        id: Option<String>,
        content: Option<String>,
    },
    Done,
}

fn api_error_message(json: &Value) -> Option<String> {
    let error = json.get("error")?;
    if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("unknown API error".to_string())
}

/// Drain an SSE byte stream, forwarding each content delta to `sink`.
///
/// Returns the concatenated text once `[DONE]` arrives.
pub async fn collect_sse<S, B, E>(
    bytes: S,
    sink: &UnboundedSender<String>,
) -> Result<Completion, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = std::pin::pin!(bytes.eventsource());
    let mut completion = Completion::default();

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
        trace!(data = %event.data, "SSE event");

        match parse_stream_chunk(&event.data)? {
            StreamChunk::Done => return Ok(completion),
            StreamChunk::Delta { id, content } => {
                if completion.request_id.is_none() {
                    completion.request_id = id;
                }
                if let Some(fragment) = content.filter(|c| !c.is_empty()) {
                    completion.text.push_str(&fragment);
                    // A closed receiver only means nobody is watching.
                    let _ = sink.send(fragment);
                }
            }
        }
    }

    warn!("SSE stream closed before [DONE]");
    if completion.text.is_empty() {
        Err(LlmError::Stream(
            "stream closed before any content arrived".to_string(),
        ))
    } else {
        Ok(completion)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let response = self.send(request, false).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        parse_response(&json)
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        sink: UnboundedSender<String>,
    ) -> Result<Completion, LlmError> {
        let response = self.send(request, true).await?;
        collect_sse(response.bytes_stream(), &sink).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
