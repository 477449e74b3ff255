//! Scripted chat model for tests and offline demos.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::LlmError;
use crate::provider::{ChatModel, Completion, CompletionRequest};

/// Replays canned completions in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model that answers with each text in turn.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for r in responses {
            model.push_text(r);
        }
        model
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Ok(Completion::new(text)));
    }

    pub fn push_error(&self, error: LlmError) {
        self.push(Err(error));
    }

    fn push(&self, entry: Result<Completion, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn next(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.script
            .lock()
            .map_err(|e| LlmError::Config(e.to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Config("scripted model exhausted".to_string())))
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.next(request)
    }

    /// Emits the scripted text word by word, keeping separators.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        sink: UnboundedSender<String>,
    ) -> Result<Completion, LlmError> {
        let completion = self.next(request)?;
        for fragment in completion.text.split_inclusive(' ') {
            let _ = sink.send(fragment.to_string());
        }
        Ok(completion)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
