use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Conversation
// =============================================================================

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// =============================================================================
// SQL dialect
// =============================================================================

/// SQL dialect the model is instructed to write.
///
/// Each dialect carries the three conventions embedded in the system prompt:
/// the row-limiting clause, identifier quoting, and the current-date
/// expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// SQLite, the shipped backend.
    #[default]
    Sqlite,
    /// Microsoft SQL Server (T-SQL).
    MsSql,
}

impl SqlDialect {
    /// Human-readable dialect name used in the expert persona.
    pub fn display_name(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "SQLite",
            SqlDialect::MsSql => "MS SQL",
        }
    }

    /// Name of the row-limiting clause (`LIMIT` or `TOP`).
    pub fn limit_keyword(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "LIMIT",
            SqlDialect::MsSql => "TOP",
        }
    }

    /// Expression evaluating to today's date.
    pub fn current_date_expr(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "date('now')",
            SqlDialect::MsSql => "CAST(GETDATE() as date)",
        }
    }
}

impl std::str::FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(SqlDialect::Sqlite),
            "mssql" | "tsql" | "sqlserver" => Ok(SqlDialect::MsSql),
            other => Err(format!("unknown SQL dialect: {}", other)),
        }
    }
}

// =============================================================================
// Query results
// =============================================================================

/// Tabular rows returned by the database capability.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// True when the executor stopped reading at its row cap.
    pub truncated: bool,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render rows in the compact tuple form used on the `SQLResult:` line.
    ///
    /// Strings are single-quoted, NULL renders as `None`, and one-column rows
    /// keep a trailing comma: `[('web',), ('api',)]`.
    pub fn to_result_text(&self) -> String {
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(render_cell).collect();
                if cells.len() == 1 {
                    format!("({},)", cells[0])
                } else {
                    format!("({})", cells.join(", "))
                }
            })
            .collect();

        let mut text = format!("[{}]", rows.join(", "));
        if self.truncated {
            text.push_str(&format!(" -- truncated to {} rows", self.rows.len()));
        }
        text
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "None".to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        serde_json::Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        other => other.to_string(),
    }
}

/// How an orchestration run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// SQL executed and the answer was summarized.
    Answered,
    /// The model did not return usable SQL.
    GenerationFailed,
    /// The database rejected or timed out on the generated SQL.
    ExecutionFailed,
    /// The safety gate refused the generated SQL.
    PolicyViolation,
}

/// Outcome of one orchestration cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResult {
    /// Natural-language answer shown to the user.
    pub answer: String,
    /// SQL that was executed (or attempted), for audit.
    pub executed_sql: Option<String>,
    /// Rows returned by the database, when execution succeeded.
    pub raw_rows: Option<RowSet>,
    /// Correlation token for tracing.
    pub run_id: Uuid,
    pub outcome: RunOutcome,
}
