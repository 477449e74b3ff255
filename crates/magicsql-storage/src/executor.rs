//! Read-only query execution against the `Logs` database.

use magicsql_core::RowSet;
use rusqlite::types::ValueRef;
use serde_json::Value;
use tracing::debug;

use crate::db::Database;
use crate::error::StorageError;

/// Database capability used by the query orchestrator.
///
/// Implementations are blocking; async callers move them onto a blocking
/// thread.
pub trait QueryExecutor: Send + Sync {
    /// Run one read-only statement and return at most `max_rows` rows.
    fn execute(&self, sql: &str, max_rows: usize) -> Result<RowSet, StorageError>;

    /// Textual description of the queryable schema.
    fn describe_schema(&self) -> Result<String, StorageError>;

    /// Abort a statement in flight. Called when a caller-side timeout fires.
    fn interrupt(&self) {}
}

impl QueryExecutor for Database {
    fn execute(&self, sql: &str, max_rows: usize) -> Result<RowSet, StorageError> {
        debug!(sql_len = sql.len(), max_rows, "Executing query");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            if !stmt.readonly() {
                return Err(StorageError::NotReadOnly);
            }

            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let width = columns.len();

            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            let mut truncated = false;

            while let Some(row) = rows.next()? {
                if out.len() >= max_rows {
                    truncated = true;
                    break;
                }
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    cells.push(value_to_json(row.get_ref(i)?));
                }
                out.push(cells);
            }

            debug!(rows = out.len(), truncated, "Query finished");
            Ok(RowSet {
                columns,
                rows: out,
                truncated,
            })
        })
    }

    fn describe_schema(&self) -> Result<String, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sql FROM sqlite_master
                 WHERE type IN ('table', 'view')
                   AND sql IS NOT NULL
                   AND name NOT LIKE 'sqlite_%'
                   AND name != 'schema_migrations'
                 ORDER BY name",
            )?;
            let ddl = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ddl.join("\n\n"))
        })
    }

    fn interrupt(&self) {
        Database::interrupt(self);
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}
