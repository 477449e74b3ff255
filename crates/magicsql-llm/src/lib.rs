//! MagicSQL LLM crate - the model capability.
//!
//! Defines the `ChatModel` trait used by the query orchestrator, an
//! OpenAI-compatible client with SSE streaming, and a scripted model for
//! tests.

pub mod error;
pub mod mock;
pub mod openai;
pub mod provider;

pub use error::LlmError;
pub use mock::ScriptedModel;
pub use openai::OpenAiClient;
pub use provider::{ChatMessage, ChatModel, Completion, CompletionRequest, MessageRole};
