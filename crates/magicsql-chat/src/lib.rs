//! MagicSQL Chat crate - conversational natural-language queries over `Logs`.
//!
//! Provides conversation memory, prompt composition, completion parsing,
//! the query orchestrator (generate, gate, execute, summarize) and the
//! session loop that ties them to a presentation.

pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod session;

pub use error::ChatError;
pub use memory::ConversationMemory;
pub use orchestrator::{OrchestratorSettings, OrchestratorState, QueryOrchestrator};
pub use prompt::{PromptComposer, PromptContext, MAX_QUESTION_LENGTH};
pub use session::{ChatSession, Presentation};
