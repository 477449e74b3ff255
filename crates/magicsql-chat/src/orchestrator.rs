//! Query orchestrator: turns one composed prompt into an answer.
//!
//! Drives generate → gate → execute → summarize against the model and
//! database capabilities, and converts every recoverable failure into a
//! user-visible answer.

use std::sync::Arc;
use std::time::Duration;

use magicsql_core::config::MagicSqlConfig;
use magicsql_core::safety::{redact_secrets, row_limit, GateDecision, SqlGate};
use magicsql_core::{QueryResult, RowSet, RunOutcome};
use magicsql_llm::{ChatModel, Completion, CompletionRequest, LlmError};
use magicsql_storage::{QueryExecutor, StorageError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ChatError;
use crate::parser::{extract_answer, extract_sql};
use crate::prompt::PromptContext;

/// Stop sequence that ends the generation call after the SQL statement.
pub const GENERATION_STOP: &str = "\nSQLResult:";

/// Characters kept back from the stream until an `Answer:` marker can no
/// longer be forming at the tail.
const ANSWER_MARKER_HOLDBACK: usize = 8;

// =============================================================================
// State machine
// =============================================================================

/// Orchestrator lifecycle for a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrchestratorState {
    Idle,
    Generating,
    Executing,
    Summarizing,
    Done,
    Failed,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Generating => "generating",
            OrchestratorState::Executing => "executing",
            OrchestratorState::Summarizing => "summarizing",
            OrchestratorState::Done => "done",
            OrchestratorState::Failed => "failed",
        }
    }

}

/// Validate that a state transition is allowed.
///
/// Valid transitions:
/// - Idle -> Generating
/// - Generating -> Executing
/// - Generating -> Failed
/// - Executing -> Summarizing
/// - Executing -> Failed
/// - Executing -> Generating (single regeneration)
/// - Summarizing -> Done
pub fn validate_transition(
    from: OrchestratorState,
    to: OrchestratorState,
) -> Result<(), ChatError> {
    use OrchestratorState::*;

    let valid = matches!(
        (from, to),
        (Idle, Generating)
            | (Generating, Executing)
            | (Generating, Failed)
            | (Executing, Summarizing)
            | (Executing, Failed)
            | (Executing, Generating)
            | (Summarizing, Done)
    );

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(from, to))
    }
}

/// Current state of one run, advanced only through validated transitions.
#[derive(Debug)]
struct RunState {
    state: OrchestratorState,
}

impl RunState {
    fn new() -> Self {
        Self {
            state: OrchestratorState::Idle,
        }
    }

    fn advance(&mut self, to: OrchestratorState) -> Result<(), ChatError> {
        validate_transition(self.state, to)?;
        debug!(from = self.state.as_str(), to = to.as_str(), "State transition");
        self.state = to;
        Ok(())
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Tunables for the orchestrator, usually derived from [`MagicSqlConfig`].
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub max_rows: usize,
    pub temperature: f32,
    pub model_timeout: Duration,
    pub query_timeout: Duration,
    max_regenerations: u32,
    secrets: Vec<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_rows: 10,
            temperature: 0.0,
            model_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(60),
            max_regenerations: 0,
            secrets: Vec::new(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &MagicSqlConfig) -> Self {
        Self {
            top_k: config.query.top_k,
            max_rows: config.query.max_rows,
            temperature: config.model.temperature,
            model_timeout: Duration::from_secs(config.model.timeout_secs),
            query_timeout: Duration::from_secs(config.database.query_timeout_secs),
            max_regenerations: 0,
            secrets: Vec::new(),
        }
        .with_max_regenerations(config.query.max_regenerations)
    }

    /// Allow at most one regeneration after a failed execution.
    pub fn with_max_regenerations(mut self, n: u32) -> Self {
        if n > 1 {
            warn!(requested = n, "max_regenerations clamped to 1");
        }
        self.max_regenerations = n.min(1);
        self
    }

    /// Strings that must never appear in user-visible answers.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    pub fn max_regenerations(&self) -> u32 {
        self.max_regenerations
    }
}

// =============================================================================
// QueryOrchestrator
// =============================================================================

/// Coordinates the model, the safety gate, and the database for one question.
pub struct QueryOrchestrator {
    model: Arc<dyn ChatModel>,
    executor: Arc<dyn QueryExecutor>,
    gate: SqlGate,
    settings: OrchestratorSettings,
}

impl QueryOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        executor: Arc<dyn QueryExecutor>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model,
            executor,
            gate: SqlGate::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Answer one question without streaming.
    ///
    /// Generation, policy, and execution failures come back as `Ok` with the
    /// matching [`RunOutcome`]; `Err` is reserved for internal faults.
    pub async fn run(&self, ctx: &PromptContext) -> Result<QueryResult, ChatError> {
        self.run_inner(ctx, None).await
    }

    /// Answer one question, forwarding answer fragments to `sink` as the
    /// model produces them. The SQL is never streamed.
    pub async fn run_streaming(
        &self,
        ctx: &PromptContext,
        sink: UnboundedSender<String>,
    ) -> Result<QueryResult, ChatError> {
        self.run_inner(ctx, Some(sink)).await
    }

    async fn run_inner(
        &self,
        ctx: &PromptContext,
        sink: Option<UnboundedSender<String>>,
    ) -> Result<QueryResult, ChatError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.pipeline(run_id, ctx, sink).instrument(span).await
    }

    async fn pipeline(
        &self,
        run_id: Uuid,
        ctx: &PromptContext,
        sink: Option<UnboundedSender<String>>,
    ) -> Result<QueryResult, ChatError> {
        info!(
            question_chars = ctx.question().chars().count(),
            model = self.model.name(),
            "Run started"
        );
        let mut run = RunState::new();
        let mut trace = String::new();
        let mut regenerations = 0u32;

        let (sql, rows) = loop {
            run.advance(OrchestratorState::Generating)?;
            let sql = match self.generate(ctx, &trace).await {
                Ok(sql) => sql,
                Err(e) => {
                    warn!(error = %e, "Generation failed");
                    run.advance(OrchestratorState::Failed)?;
                    return Ok(self.failed(run_id, RunOutcome::GenerationFailed, None, &e));
                }
            };

            if let GateDecision::Deny { class, reason } = self.gate.check(&sql) {
                warn!(?class, %reason, sql_len = sql.len(), "Generated SQL refused");
                debug!(%sql, "Refused SQL");
                run.advance(OrchestratorState::Failed)?;
                let e = ChatError::PolicyViolation(reason);
                return Ok(self.failed(run_id, RunOutcome::PolicyViolation, None, &e));
            }
            self.check_row_limit(&sql);

            run.advance(OrchestratorState::Executing)?;
            match self.execute(&sql).await {
                Ok(rows) => break (sql, rows),
                Err(e) if regenerations < self.settings.max_regenerations() => {
                    regenerations += 1;
                    warn!(error = %e, attempt = regenerations, "Execution failed, regenerating");
                    trace = format!("SQLQuery: {}\nSQLResult: Error: {}\n", sql, e);
                }
                Err(e) => {
                    warn!(error = %e, "Execution failed");
                    run.advance(OrchestratorState::Failed)?;
                    return Ok(self.failed(run_id, RunOutcome::ExecutionFailed, Some(sql), &e));
                }
            }
        };

        run.advance(OrchestratorState::Summarizing)?;
        let (answer, outcome) = match self.summarize(ctx, &sql, &rows, sink).await {
            Ok(answer) => (answer, RunOutcome::Answered),
            Err(e) => {
                error!(error = %e, "Summarization failed");
                (
                    format!(
                        "The query returned {}, but I could not phrase an answer ({}).",
                        rows.to_result_text(),
                        e
                    ),
                    RunOutcome::GenerationFailed,
                )
            }
        };
        run.advance(OrchestratorState::Done)?;
        info!(rows = rows.len(), outcome = ?outcome, "Run finished");

        Ok(QueryResult {
            answer: self.redact(&answer),
            executed_sql: Some(sql),
            raw_rows: Some(rows),
            run_id,
            outcome,
        })
    }

    /// Ask the model for a SQL statement.
    async fn generate(&self, ctx: &PromptContext, trace: &str) -> Result<String, ChatError> {
        let prompt = ctx.with_scratchpad(format!("{}SQLQuery:", trace));
        debug!(prompt = %prompt.render(), "Generation prompt");

        let request = CompletionRequest::new(prompt.to_messages())
            .with_stop(GENERATION_STOP)
            .with_temperature(self.settings.temperature);
        let completion = self.call_model(&request, None).await?;

        let sql = extract_sql(&completion.text).ok_or_else(|| {
            ChatError::Generation("the model did not return a SQL query".to_string())
        })?;
        debug!(%sql, request_id = ?completion.request_id, "SQL generated");
        Ok(sql)
    }

    /// Run the statement on a blocking thread under the query timeout.
    async fn execute(&self, sql: &str) -> Result<RowSet, ChatError> {
        let executor = Arc::clone(&self.executor);
        let statement = sql.to_string();
        let max_rows = self.settings.max_rows;
        let task = tokio::task::spawn_blocking(move || executor.execute(&statement, max_rows));

        let mut rows = match tokio::time::timeout(self.settings.query_timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| ChatError::Execution(e.to_string()))?,
            Ok(Err(join)) => {
                return Err(ChatError::Execution(format!("query task failed: {}", join)))
            }
            Err(_) => {
                self.executor.interrupt();
                let e = StorageError::Timeout(self.settings.query_timeout.as_secs());
                return Err(ChatError::Execution(e.to_string()));
            }
        };

        if rows.rows.len() > max_rows {
            rows.rows.truncate(max_rows);
            rows.truncated = true;
        }
        debug!(rows = rows.len(), truncated = rows.truncated, "SQL executed");
        Ok(rows)
    }

    /// Ask the model to phrase the answer from the result rows.
    ///
    /// When streaming, fragments reach `sink` already stripped of the
    /// `Answer:` marker and redacted. On success the streamed text adds up
    /// to exactly the returned answer.
    async fn summarize(
        &self,
        ctx: &PromptContext,
        sql: &str,
        rows: &RowSet,
        sink: Option<UnboundedSender<String>>,
    ) -> Result<String, ChatError> {
        let scratchpad = format!(
            "SQLQuery: {}\nSQLResult: {}\nAnswer:",
            sql,
            rows.to_result_text()
        );
        let request = CompletionRequest::new(ctx.with_scratchpad(scratchpad).to_messages())
            .with_temperature(self.settings.temperature);

        let (completion, mut stream) = match sink {
            Some(sink) => {
                let (tx, rx) = unbounded_channel();
                let mut stream = AnswerStream::new(sink, &self.settings.secrets);
                let (completion, ()) =
                    tokio::join!(self.call_model(&request, Some(tx)), stream.forward(rx));
                (completion?, Some(stream))
            }
            None => (self.call_model(&request, None).await?, None),
        };
        debug!(request_id = ?completion.request_id, "Answer generated");

        let answer = self.redact(&extract_answer(&completion.text));
        if answer.is_empty() {
            return Err(ChatError::Generation("the model returned an empty answer".to_string()));
        }
        if let Some(stream) = stream.as_mut() {
            stream.finish(&answer);
        }
        Ok(answer)
    }

    async fn call_model(
        &self,
        request: &CompletionRequest,
        sink: Option<UnboundedSender<String>>,
    ) -> Result<Completion, ChatError> {
        let call = async {
            match sink {
                Some(sink) => self.model.complete_streaming(request, sink).await,
                None => self.model.complete(request).await,
            }
        };
        match tokio::time::timeout(self.settings.model_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(LlmError::Timeout(self.settings.model_timeout.as_secs()).into()),
        }
    }

    fn check_row_limit(&self, sql: &str) {
        match row_limit(sql) {
            Some(n) if n > self.settings.top_k as u64 => {
                warn!(limit = n, top_k = self.settings.top_k, "Generated SQL exceeds top_k");
            }
            Some(_) => {}
            None => debug!("Generated SQL has no row limit; max_rows applies"),
        }
    }

    fn failed(
        &self,
        run_id: Uuid,
        outcome: RunOutcome,
        executed_sql: Option<String>,
        err: &ChatError,
    ) -> QueryResult {
        let answer = match outcome {
            RunOutcome::GenerationFailed => format!(
                "I couldn't turn that question into a SQL query ({}). Could you rephrase it?",
                err
            ),
            RunOutcome::ExecutionFailed => format!(
                "The query could not be run: {}. Try rephrasing the question or naming the columns you need.",
                err
            ),
            RunOutcome::PolicyViolation => format!(
                "I can only run read-only queries, so I did not run the generated statement ({}).",
                err
            ),
            RunOutcome::Answered => err.to_string(),
        };

        QueryResult {
            answer: self.redact(&answer),
            executed_sql,
            raw_rows: None,
            run_id,
            outcome,
        }
    }

    fn redact(&self, text: &str) -> String {
        let secrets: Vec<&str> = self.settings.secrets.iter().map(String::as_str).collect();
        redact_secrets(text, &secrets)
    }
}

// =============================================================================
// Answer streaming
// =============================================================================

/// Turns raw summarization fragments into the answer text the user sees.
///
/// Only ever sends a prefix of the current visible answer, holding back a
/// tail long enough to hide a partially received marker or secret.
struct AnswerStream<'a> {
    sink: UnboundedSender<String>,
    secrets: Vec<&'a str>,
    holdback: usize,
    raw: String,
    sent: String,
}

impl<'a> AnswerStream<'a> {
    fn new(sink: UnboundedSender<String>, secrets: &'a [String]) -> Self {
        let secrets: Vec<&str> = secrets.iter().map(String::as_str).collect();
        let holdback = secrets
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0)
            .max(ANSWER_MARKER_HOLDBACK);
        Self {
            sink,
            secrets,
            holdback,
            raw: String::new(),
            sent: String::new(),
        }
    }

    async fn forward(&mut self, mut rx: UnboundedReceiver<String>) {
        while let Some(fragment) = rx.recv().await {
            self.raw.push_str(&fragment);
            let visible = redact_secrets(&extract_answer(&self.raw), &self.secrets);
            let ready = visible.chars().count().saturating_sub(self.holdback);
            let ready: String = visible.chars().take(ready).collect();
            self.send_through(&ready);
        }
    }

    /// Send whatever of the final answer has not been streamed yet.
    fn finish(&mut self, answer: &str) {
        self.send_through(answer);
    }

    fn send_through(&mut self, text: &str) {
        // Once the visible text stops extending what was sent, stay quiet;
        // the presentation renders the final answer instead.
        let Some(delta) = text.strip_prefix(self.sent.as_str()) else {
            return;
        };
        if delta.is_empty() {
            return;
        }
        let delta = delta.to_string();
        self.sent.push_str(&delta);
        let _ = self.sink.send(delta);
    }
}
