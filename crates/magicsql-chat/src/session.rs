//! Session loop: one conversation, one request at a time.

use async_trait::async_trait;
use magicsql_core::{QueryResult, Role, Turn};
use magicsql_storage::SchemaDescriptor;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{error, info};

use crate::error::ChatError;
use crate::memory::ConversationMemory;
use crate::orchestrator::QueryOrchestrator;
use crate::prompt::{validate_question, PromptComposer};

/// Answer recorded when the orchestrator itself faults.
const INTERNAL_ERROR_ANSWER: &str = "Something went wrong while answering. Please try again.";

/// The chat UI driven by [`ChatSession::run`].
#[async_trait]
pub trait Presentation: Send {
    fn render_user_turn(&mut self, text: &str);

    fn render_assistant_turn(&mut self, text: &str);

    /// Show part of an answer that is still being produced.
    fn render_fragment(&mut self, fragment: &str);

    fn render_thinking_indicator(&mut self, on: bool);

    /// Next message from the user; `None` ends the session.
    async fn on_user_input(&mut self) -> Option<String>;

    /// Whether the user asked to clear the conversation since the last call.
    fn on_reset_requested(&mut self) -> bool;

    /// Show the SQL trace of a finished run. Hidden unless overridden.
    fn render_trace(&mut self, _result: &QueryResult) {}
}

/// A single user's conversation with the `Logs` table.
pub struct ChatSession {
    orchestrator: QueryOrchestrator,
    composer: PromptComposer,
    schema: SchemaDescriptor,
    memory: ConversationMemory,
    starter: String,
    streaming: bool,
    last_result: Option<QueryResult>,
}

impl ChatSession {
    /// Create a session seeded with the starter assistant turn.
    ///
    /// `memory_limit` of 0 keeps every turn.
    pub fn new(
        orchestrator: QueryOrchestrator,
        composer: PromptComposer,
        schema: SchemaDescriptor,
        memory_limit: usize,
        starter: impl Into<String>,
    ) -> Self {
        let starter = starter.into();
        let mut memory = ConversationMemory::bounded(memory_limit);
        memory.reset(Turn::assistant(starter.clone()));
        Self {
            orchestrator,
            composer,
            schema,
            memory,
            starter,
            streaming: false,
            last_result: None,
        }
    }

    /// Stream answers through the presentation while they are generated.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Result of the most recent orchestrator run, for SQL display.
    pub fn last_result(&self) -> Option<&QueryResult> {
        self.last_result.as_ref()
    }

    /// Clear the conversation back to the starter turn.
    pub fn reset(&mut self) {
        self.memory.reset(Turn::assistant(self.starter.clone()));
        self.last_result = None;
        info!("Conversation reset");
    }

    /// Answer one message and record the exchange.
    pub async fn send(&mut self, user_text: &str) -> Result<String, ChatError> {
        self.send_inner(user_text, None).await
    }

    /// Like [`send`](Self::send), forwarding answer fragments to `sink`.
    pub async fn send_streaming(
        &mut self,
        user_text: &str,
        sink: UnboundedSender<String>,
    ) -> Result<String, ChatError> {
        self.send_inner(user_text, Some(sink)).await
    }

    async fn send_inner(
        &mut self,
        user_text: &str,
        sink: Option<UnboundedSender<String>>,
    ) -> Result<String, ChatError> {
        // The prompt sees the history before this question.
        let history = self.memory.as_sequence();
        let ctx = self
            .composer
            .compose(user_text, &history, self.schema.describe())?;

        let result = match sink {
            Some(sink) => self.orchestrator.run_streaming(&ctx, sink).await,
            None => self.orchestrator.run(&ctx).await,
        };

        self.memory.append(Turn::user(ctx.question()));
        match result {
            Ok(result) => {
                let answer = result.answer.clone();
                self.memory.append(Turn::assistant(answer.clone()));
                self.last_result = Some(result);
                Ok(answer)
            }
            Err(e) => {
                error!(error = %e, "Orchestrator fault");
                self.memory.append(Turn::assistant(INTERNAL_ERROR_ANSWER));
                self.last_result = None;
                Err(e)
            }
        }
    }

    /// Drive the conversation until the presentation runs out of input.
    pub async fn run(&mut self, presentation: &mut dyn Presentation) -> Result<(), ChatError> {
        self.render_history(presentation);

        loop {
            if presentation.on_reset_requested() {
                self.reset();
                self.render_history(presentation);
            }

            let Some(input) = presentation.on_user_input().await else {
                info!("Input closed, ending session");
                return Ok(());
            };
            if input.trim().is_empty() {
                continue;
            }
            if let Err(e) = validate_question(&input) {
                presentation.render_assistant_turn(&e.to_string());
                continue;
            }

            presentation.render_user_turn(input.trim());
            presentation.render_thinking_indicator(true);

            let result = if self.streaming {
                self.send_with_fragments(&input, presentation).await
            } else {
                self.send(&input).await
            };

            presentation.render_thinking_indicator(false);
            match result {
                Ok(answer) => presentation.render_assistant_turn(&answer),
                Err(e) if e.is_validation() => presentation.render_assistant_turn(&e.to_string()),
                Err(_) => presentation.render_assistant_turn(INTERNAL_ERROR_ANSWER),
            }
            if let Some(result) = &self.last_result {
                presentation.render_trace(result);
            }
        }
    }

    async fn send_with_fragments(
        &mut self,
        input: &str,
        presentation: &mut dyn Presentation,
    ) -> Result<String, ChatError> {
        let (tx, mut rx) = unbounded_channel::<String>();
        let send = self.send_streaming(input, tx);
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                Some(fragment) = rx.recv() => presentation.render_fragment(&fragment),
            }
        };
        while let Ok(fragment) = rx.try_recv() {
            presentation.render_fragment(&fragment);
        }
        result
    }

    fn render_history(&self, presentation: &mut dyn Presentation) {
        for turn in self.memory.iter() {
            match turn.role() {
                Role::User => presentation.render_user_turn(turn.text()),
                Role::Assistant => presentation.render_assistant_turn(turn.text()),
            }
        }
    }
}
