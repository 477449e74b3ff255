//! End-to-end tests for the chat session.
//!
//! Each test seeds its own SQLite file, reopens it read-only the way the
//! binary does, and drives a `ChatSession` with a scripted model.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use magicsql_chat::{
    ChatSession, OrchestratorSettings, PromptComposer, QueryOrchestrator,
};
use magicsql_core::config::MagicSqlConfig;
use magicsql_core::{Role, RowSet, RunOutcome, SqlDialect, Turn};
use magicsql_llm::{MessageRole, ScriptedModel};
use magicsql_storage::{seed_demo_logs, Database, QueryExecutor, SchemaDescriptor, StorageError};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

const STARTER: &str = "How can I help you?";

/// Create a seeded database file and reopen it read-only.
fn read_only_db(dir: &TempDir) -> Arc<Database> {
    let path = dir.path().join("logs.db");
    let db = Database::new(&path).unwrap();
    db.with_conn(|conn| seed_demo_logs(conn, 30)).unwrap();
    drop(db);
    Arc::new(Database::open_read_only(&path, Duration::from_millis(500)).unwrap())
}

fn make_session(model: Arc<ScriptedModel>, executor: Arc<dyn QueryExecutor>) -> ChatSession {
    make_session_with_limit(model, executor, MagicSqlConfig::default().memory.max_turns)
}

fn make_session_with_limit(
    model: Arc<ScriptedModel>,
    executor: Arc<dyn QueryExecutor>,
    max_turns: usize,
) -> ChatSession {
    let config = MagicSqlConfig::default();
    let orchestrator =
        QueryOrchestrator::new(model, executor, OrchestratorSettings::from_config(&config));
    ChatSession::new(
        orchestrator,
        PromptComposer::new(SqlDialect::Sqlite, config.query.top_k),
        SchemaDescriptor::logs(SqlDialect::Sqlite),
        max_turns,
        STARTER,
    )
}

/// Wraps a real executor and records every statement passed to it.
struct SpyExecutor {
    inner: Arc<Database>,
    seen: Mutex<Vec<String>>,
}

impl QueryExecutor for SpyExecutor {
    fn execute(&self, sql: &str, max_rows: usize) -> Result<RowSet, StorageError> {
        self.seen.lock().unwrap().push(sql.to_string());
        self.inner.execute(sql, max_rows)
    }

    fn describe_schema(&self) -> Result<String, StorageError> {
        self.inner.describe_schema()
    }
}

// =============================================================================
// Memory growth
// =============================================================================

#[tokio::test]
async fn test_n_questions_give_two_n_plus_one_turns() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::new());
    let questions = ["How many entries?", "How many errors?", "How many warnings?"];
    for _ in questions {
        model.push_text("SELECT COUNT(*) FROM [Logs]");
        model.push_text("There are 30 entries.");
    }
    let mut session = make_session(model, read_only_db(&dir));

    for q in questions {
        session.send(q).await.unwrap();
    }

    let turns = session.memory().as_sequence();
    assert_eq!(turns.len(), 2 * questions.len() + 1);
    assert_eq!(turns[0].text(), STARTER);
    for (i, q) in questions.iter().enumerate() {
        assert_eq!(turns[1 + 2 * i].role(), Role::User);
        assert_eq!(turns[1 + 2 * i].text(), *q);
        assert_eq!(turns[2 + 2 * i].role(), Role::Assistant);
    }
}

#[tokio::test]
async fn test_follow_up_prompt_carries_history() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_responses([
        "SELECT COUNT(*) FROM [Logs] WHERE [Type] = 'Error'",
        "There were 12 errors.",
        "SELECT [SourceSystem], COUNT(*) FROM [Logs] WHERE [Type] = 'Error' GROUP BY [SourceSystem]",
        "Mostly billing and warehouse.",
    ]));
    let mut session = make_session(model.clone(), read_only_db(&dir));

    session.send("How many errors were logged?").await.unwrap();
    session.send("Which systems logged them?").await.unwrap();

    let requests = model.requests();
    let follow_up = &requests[2];
    let contents: Vec<&str> = follow_up.messages.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"How many errors were logged?"));
    assert!(contents.contains(&"There were 12 errors."));
    assert!(contents
        .last()
        .unwrap()
        .starts_with("Question: Which systems logged them?"));
}

#[tokio::test]
async fn test_bounded_memory_evicts_oldest_and_prompts_match() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::new());
    let questions = ["How many entries?", "How many errors?", "How many warnings?"];
    for i in 0..questions.len() {
        model.push_text("SELECT COUNT(*) FROM [Logs]");
        model.push_text(format!("Answer {}.", i + 1));
    }
    let mut session = make_session_with_limit(model.clone(), read_only_db(&dir), 3);

    let mut snapshots = Vec::new();
    for q in questions {
        snapshots.push(session.memory().as_sequence());
        session.send(q).await.unwrap();
        assert!(session.memory().len() <= 3);
    }

    let texts = |turns: &[Turn]| -> Vec<String> {
        turns.iter().map(|t| t.text().to_string()).collect()
    };
    assert_eq!(texts(&snapshots[0]), [STARTER]);
    assert_eq!(texts(&snapshots[1]), [STARTER, "How many entries?", "Answer 1."]);
    assert_eq!(texts(&snapshots[2]), ["Answer 1.", "How many errors?", "Answer 2."]);
    assert_eq!(
        texts(&session.memory().as_sequence()),
        ["Answer 2.", "How many warnings?", "Answer 3."]
    );

    // Both model calls for a question see exactly the memory held before it.
    let requests = model.requests();
    assert_eq!(requests.len(), 2 * questions.len());
    for (i, request) in requests.iter().enumerate() {
        let snapshot = &snapshots[i / 2];
        let messages = &request.messages;
        assert_eq!(messages[0].role, MessageRole::System);
        let history = &messages[1..messages.len() - 1];
        assert_eq!(history.len(), snapshot.len(), "request {}", i);
        for (message, turn) in history.iter().zip(snapshot) {
            let role = match turn.role() {
                Role::User => MessageRole::User,
                Role::Assistant => MessageRole::Assistant,
            };
            assert_eq!(message.role, role, "request {}", i);
            assert_eq!(message.content, turn.text(), "request {}", i);
        }
    }
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_bad_column_then_session_keeps_working() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_responses([
        "SELECT [Severity] FROM [Logs]",
        "SELECT COUNT(*) FROM [Logs]",
        "There are 30 entries.",
    ]));
    let mut session = make_session(model, read_only_db(&dir));

    let answer = session.send("Show severities").await.unwrap();
    assert_eq!(
        session.last_result().map(|r| r.outcome),
        Some(RunOutcome::ExecutionFailed)
    );
    assert_eq!(session.memory().last().map(|t| t.text()), Some(answer.as_str()));

    let answer = session.send("How many entries?").await.unwrap();
    assert_eq!(answer, "There are 30 entries.");
    assert_eq!(session.memory().len(), 5);
}

#[tokio::test]
async fn test_identical_questions_each_append_one_answer() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_responses([
        "SELECT COUNT(*) FROM [Logs]",
        "There are 30 entries.",
        "SELECT COUNT(*) FROM [Logs]",
        "Still 30 entries.",
    ]));
    let mut session = make_session(model.clone(), read_only_db(&dir));

    session.send("How many entries?").await.unwrap();
    session.send("How many entries?").await.unwrap();

    let assistant_turns = session
        .memory()
        .iter()
        .filter(|t| t.role() == Role::Assistant)
        .count();
    assert_eq!(assistant_turns, 3);
    // No caching: both questions reached the model.
    assert_eq!(model.requests().len(), 4);
}

#[tokio::test]
async fn test_mutating_sql_is_refused_before_execution() {
    let dir = tempfile::tempdir().unwrap();
    let spy = Arc::new(SpyExecutor {
        inner: read_only_db(&dir),
        seen: Mutex::new(Vec::new()),
    });
    let model = Arc::new(ScriptedModel::with_responses([
        "DROP TABLE [Logs]",
        "SELECT 1; DELETE FROM [Logs]",
        "SELECT [GUID] INTO [Copy] FROM [Logs]",
    ]));
    let mut session = make_session(model, spy.clone());

    for q in ["Drop it", "Select then delete", "Copy the table"] {
        session.send(q).await.unwrap();
        assert_eq!(
            session.last_result().map(|r| r.outcome),
            Some(RunOutcome::PolicyViolation)
        );
    }

    assert!(spy.seen.lock().unwrap().is_empty());
    let remaining = spy.inner.execute("SELECT COUNT(*) FROM [Logs]", 1).unwrap();
    assert_eq!(remaining.rows[0][0], serde_json::json!(30));
}

// =============================================================================
// Limits and reset
// =============================================================================

#[tokio::test]
async fn test_results_never_exceed_max_rows() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_responses([
        "SELECT [GUID], [Description] FROM [Logs]",
        "Here are the latest entries.",
    ]));
    let mut session = make_session(model.clone(), read_only_db(&dir));

    session.send("List every entry").await.unwrap();

    let result = session.last_result().unwrap();
    let rows = result.raw_rows.as_ref().unwrap();
    assert_eq!(rows.len(), MagicSqlConfig::default().query.max_rows);
    assert!(rows.truncated);

    let requests = model.requests();
    let system = &requests[0].messages[0].content;
    assert!(system.contains("at most 10 results using the LIMIT clause"));
}

#[tokio::test]
async fn test_reset_mid_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_responses([
        "SELECT 1",
        "One.",
        "SELECT 2",
        "Two.",
    ]));
    let mut session = make_session(model.clone(), read_only_db(&dir));

    session.send("first").await.unwrap();
    session.reset();
    session.send("second").await.unwrap();

    assert_eq!(session.memory().len(), 3);
    // After the reset the prompt holds only the starter turn.
    assert_eq!(model.requests()[2].messages.len(), 3);
}
