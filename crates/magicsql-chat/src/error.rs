//! Error types for the conversational interface.

use magicsql_llm::LlmError;

use crate::orchestrator::OrchestratorState;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("SQL generation failed: {0}")]
    Generation(String),
    #[error("SQL execution failed: {0}")]
    Execution(String),
    #[error("query refused: {0}")]
    PolicyViolation(String),
    #[error("invalid orchestrator transition: {0:?} -> {1:?}")]
    InvalidTransition(OrchestratorState, OrchestratorState),
}

impl ChatError {
    /// True for errors caused by the user's input rather than the pipeline.
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        ChatError::Generation(err.to_string())
    }
}
