//! Schema Descriptor: the fixed table description embedded in every prompt.

use magicsql_core::SqlDialect;
use tracing::{info, warn};

use crate::executor::QueryExecutor;
use crate::migrations::LOGS_TABLE_SQLITE;

const LOGS_TABLE_MSSQL: &str = "CREATE TABLE [Logs] (
\t[GUID] NVARCHAR(50) COLLATE SQL_Latin1_General_CP1_CI_AS NULL,
\t[TimeStamp] DATETIMEOFFSET NULL,
\t[SourceSystem] NVARCHAR(100) COLLATE SQL_Latin1_General_CP1_CI_AS NULL,
\t[SourceApplication] NVARCHAR(max) COLLATE SQL_Latin1_General_CP1_CI_AS NULL,
\t[SourceModule] NVARCHAR(max) COLLATE SQL_Latin1_General_CP1_CI_AS NULL,
\t[Type] NVARCHAR(50) COLLATE SQL_Latin1_General_CP1_CI_AS NULL,
\t[Tags] NVARCHAR(max) COLLATE SQL_Latin1_General_CP1_CI_AS NULL,
\t[Description] NVARCHAR(max) COLLATE SQL_Latin1_General_CP1_CI_AS NULL
)";

/// Immutable textual description of the queryable schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDescriptor {
    text: String,
}

impl SchemaDescriptor {
    /// Builtin description of the `Logs` table for the given dialect.
    pub fn logs(dialect: SqlDialect) -> Self {
        let (ddl, timestamp_note) = match dialect {
            SqlDialect::Sqlite => (
                LOGS_TABLE_SQLITE,
                "TimeStamp holds ISO-8601 text with a UTC offset; compare it with date() and datetime().",
            ),
            SqlDialect::MsSql => (
                LOGS_TABLE_MSSQL,
                "TimeStamp is a DATETIMEOFFSET.",
            ),
        };

        Self::from_text(format!(
            "{}\n\n/*\nText columns compare case-insensitively.\n{}\nType is a severity such as 'Information', 'Warning' or 'Error'.\nTags holds comma-separated labels.\n*/",
            ddl, timestamp_note
        ))
    }

    /// Snapshot the executor's schema, falling back to the builtin `Logs`
    /// description when introspection fails or finds nothing.
    pub fn from_executor(executor: &dyn QueryExecutor, dialect: SqlDialect) -> Self {
        match executor.describe_schema() {
            Ok(text) if !text.trim().is_empty() => {
                info!(len = text.len(), "Schema introspected from database");
                Self::from_text(text)
            }
            Ok(_) => {
                warn!("Database reported no tables, using builtin Logs schema");
                Self::logs(dialect)
            }
            Err(e) => {
                warn!(error = %e, "Schema introspection failed, using builtin Logs schema");
                Self::logs(dialect)
            }
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The schema text. Identical on every call.
    pub fn describe(&self) -> &str {
        &self.text
    }
}
