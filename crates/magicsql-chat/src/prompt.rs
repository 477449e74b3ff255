//! Prompt composition.
//!
//! Builds the structured model input from the dialect rules, the schema
//! text, the conversation so far, and the new question.

use magicsql_core::{Role, SqlDialect, Turn};
use magicsql_llm::ChatMessage;

use crate::error::ChatError;

/// Maximum question length in characters.
pub const MAX_QUESTION_LENGTH: usize = 2000;

/// Transient per-request prompt. Never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptContext {
    system: String,
    conversation: Vec<Turn>,
    question: String,
    scratchpad: String,
}

impl PromptContext {
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Copy of this context with the scratchpad replaced.
    pub fn with_scratchpad(&self, scratchpad: impl Into<String>) -> Self {
        Self {
            scratchpad: scratchpad.into(),
            ..self.clone()
        }
    }

    /// Render as chat messages: system, history, then the question with the
    /// scratchpad appended on the following line.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.conversation.len() + 2);
        messages.push(ChatMessage::system(self.system.clone()));
        for turn in &self.conversation {
            messages.push(match turn.role() {
                Role::User => ChatMessage::user(turn.text()),
                Role::Assistant => ChatMessage::assistant(turn.text()),
            });
        }
        messages.push(ChatMessage::user(self.final_user_message()));
        messages
    }

    /// Flattened text form, for logging and comparison.
    pub fn render(&self) -> String {
        let mut out = format!("system: {}\n", self.system);
        for turn in &self.conversation {
            out.push_str(&format!("{}: {}\n", turn.role().as_str(), turn.text()));
        }
        out.push_str(&format!("user: {}", self.final_user_message()));
        out
    }

    fn final_user_message(&self) -> String {
        if self.scratchpad.is_empty() {
            format!("Question: {}", self.question)
        } else {
            format!("Question: {}\n{}", self.question, self.scratchpad)
        }
    }
}

/// Builds prompts for one dialect and result limit.
#[derive(Clone, Debug)]
pub struct PromptComposer {
    dialect: SqlDialect,
    top_k: usize,
}

impl PromptComposer {
    pub fn new(dialect: SqlDialect, top_k: usize) -> Self {
        Self { dialect, top_k }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Validate the question and assemble the prompt.
    ///
    /// Deterministic: identical inputs give identical contexts.
    pub fn compose(
        &self,
        question: &str,
        conversation: &[Turn],
        schema_text: &str,
    ) -> Result<PromptContext, ChatError> {
        let question = validate_question(question)?;

        Ok(PromptContext {
            system: self.system_instruction(schema_text),
            conversation: conversation.to_vec(),
            question: question.to_string(),
            scratchpad: String::new(),
        })
    }

    /// The fixed system instruction for this dialect.
    pub fn system_instruction(&self, schema_text: &str) -> String {
        let name = self.dialect.display_name();
        format!(
            "You are an {name} expert. Given an input question, first create a syntactically correct {name} query to run, then look at the results of the query and return the answer to the input question.\n\
Unless the user specifies in the question a specific number of examples to obtain, query for at most {top_k} results using the {limit} clause as per {name}. You can order the results to return the most informative data in the database.\n\
Never query for all columns from a table. You must query only the columns that are needed to answer the question. Wrap each column name in square brackets ([]) to denote them as delimited identifiers.\n\
Pay attention to use only the column names you can see in the tables below. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.\n\
Pay attention to use {today} function to get the current date, if the question involves \"today\".\n\
\n\
Use the following format:\n\
\n\
Question: Question here\n\
SQLQuery: SQL Query to run\n\
SQLResult: Result of the SQLQuery\n\
Answer: Final answer here\n\
\n\
Only use the following tables:\n\
\n\
{schema}\n",
            name = name,
            top_k = self.top_k,
            limit = self.dialect.limit_keyword(),
            today = self.dialect.current_date_expr(),
            schema = schema_text.trim_end(),
        )
    }
}

/// Reject empty or oversized questions; returns the trimmed question.
pub fn validate_question(question: &str) -> Result<&str, ChatError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if trimmed.chars().count() > MAX_QUESTION_LENGTH {
        return Err(ChatError::MessageTooLong(MAX_QUESTION_LENGTH));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use magicsql_llm::MessageRole;

    const SCHEMA: &str = "CREATE TABLE [Logs] ([GUID] TEXT, [Type] TEXT)";

    fn composer() -> PromptComposer {
        PromptComposer::new(SqlDialect::Sqlite, 10)
    }

    fn history() -> Vec<Turn> {
        vec![
            Turn::assistant("How can I help you?"),
            Turn::user("How many errors today?"),
            Turn::assistant("There were 3 errors today."),
        ]
    }

    #[test]
    fn test_compose_is_deterministic() {
        let a = composer().compose("Which system?", &history(), SCHEMA).unwrap();
        let b = composer().compose("Which system?", &history(), SCHEMA).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn test_system_instruction_sqlite_rules() {
        let ctx = composer().compose("q", &[], SCHEMA).unwrap();
        let system = ctx.system();
        assert!(system.starts_with("You are an SQLite expert."));
        assert!(system.contains("at most 10 results using the LIMIT clause"));
        assert!(system.contains("date('now')"));
        assert!(system.contains("square brackets ([])"));
        assert!(system.contains("Only use the following tables:\n\nCREATE TABLE [Logs]"));
    }

    #[test]
    fn test_system_instruction_mssql_rules() {
        let composer = PromptComposer::new(SqlDialect::MsSql, 10);
        let system = composer.system_instruction(SCHEMA);
        assert!(system.starts_with("You are an MS SQL expert."));
        assert!(system.contains("at most 10 results using the TOP clause as per MS SQL"));
        assert!(system.contains("CAST(GETDATE() as date)"));
    }

    #[test]
    fn test_format_template_present() {
        let system = composer().system_instruction(SCHEMA);
        assert!(system.contains(
            "Question: Question here\nSQLQuery: SQL Query to run\nSQLResult: Result of the SQLQuery\nAnswer: Final answer here"
        ));
    }

    #[test]
    fn test_messages_order() {
        let ctx = composer()
            .compose("Which system logged them?", &history(), SCHEMA)
            .unwrap();
        let messages = ctx.to_messages();

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[2].content, "How many errors today?");
        assert_eq!(messages[4].role, MessageRole::User);
        assert_eq!(messages[4].content, "Question: Which system logged them?");
    }

    #[test]
    fn test_scratchpad_appended_to_question() {
        let ctx = composer()
            .compose("How many?", &[], SCHEMA)
            .unwrap()
            .with_scratchpad("SQLQuery:");
        let last = ctx.to_messages().pop().unwrap();
        assert_eq!(last.content, "Question: How many?\nSQLQuery:");
        assert!(ctx.render().ends_with("user: Question: How many?\nSQLQuery:"));
    }

    #[test]
    fn test_empty_question_rejected() {
        assert!(matches!(
            composer().compose("   ", &[], SCHEMA),
            Err(ChatError::EmptyMessage)
        ));
    }

    #[test]
    fn test_long_question_rejected() {
        let long = "x".repeat(MAX_QUESTION_LENGTH + 1);
        assert!(matches!(
            composer().compose(&long, &[], SCHEMA),
            Err(ChatError::MessageTooLong(MAX_QUESTION_LENGTH))
        ));
        let exact = "é".repeat(MAX_QUESTION_LENGTH);
        assert!(composer().compose(&exact, &[], SCHEMA).is_ok());
    }

    #[test]
    fn test_question_is_trimmed() {
        let ctx = composer().compose("  errors?\n", &[], SCHEMA).unwrap();
        assert_eq!(ctx.question(), "errors?");
    }
}
