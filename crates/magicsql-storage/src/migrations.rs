//! Database schema migrations and demo data.
//!
//! Creates the `Logs` table queried by the chat session. Databases that
//! already carry a `Logs` table (imported from elsewhere) are left untouched.

use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

use crate::error::StorageError;

/// DDL of the `Logs` table in the SQLite dialect.
///
/// Shared with the schema descriptor so the prompt always matches the
/// table that migrations create.
pub const LOGS_TABLE_SQLITE: &str = "CREATE TABLE [Logs] (
\t[GUID] TEXT COLLATE NOCASE NULL,
\t[TimeStamp] TEXT NULL,
\t[SourceSystem] TEXT COLLATE NOCASE NULL,
\t[SourceApplication] TEXT COLLATE NOCASE NULL,
\t[SourceModule] TEXT COLLATE NOCASE NULL,
\t[Type] TEXT COLLATE NOCASE NULL,
\t[Tags] TEXT COLLATE NOCASE NULL,
\t[Description] TEXT COLLATE NOCASE NULL
)";

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| StorageError::Migration(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Migration(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: logs_table");
    }

    Ok(())
}

/// Version 1: the `Logs` table and a timestamp index.
fn apply_v1(conn: &Connection) -> Result<(), StorageError> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'Logs'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    if exists {
        info!("Logs table already present, skipping creation");
    } else {
        conn.execute_batch(LOGS_TABLE_SQLITE)
            .map_err(|e| StorageError::Migration(format!("Failed to create Logs: {}", e)))?;
    }

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON [Logs]([TimeStamp]);
         INSERT INTO schema_migrations (version, name) VALUES (1, 'logs_table');",
    )
    .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}

const DEMO_SYSTEMS: &[(&str, &str, &str)] = &[
    ("billing", "invoice-service", "PaymentProcessor"),
    ("crm", "customer-portal", "LoginController"),
    ("warehouse", "stock-sync", "InventoryImporter"),
    ("billing", "invoice-service", "PdfRenderer"),
];

const DEMO_EVENTS: &[(&str, &str, &str)] = &[
    ("Information", "startup", "Service started"),
    ("Warning", "latency", "Upstream call took longer than 2s"),
    ("Error", "timeout,db", "Database connection timed out"),
    ("Information", "audit", "User signed in"),
    ("Error", "validation", "Rejected payload: missing customer id"),
];

/// Insert `count` synthetic log rows, newest first, one minute apart.
///
/// Returns the number of rows inserted.
pub fn seed_demo_logs(conn: &Connection, count: usize) -> Result<usize, StorageError> {
    let now = Utc::now();
    let mut stmt = conn.prepare(
        "INSERT INTO [Logs] ([GUID], [TimeStamp], [SourceSystem], [SourceApplication],
                             [SourceModule], [Type], [Tags], [Description])
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for i in 0..count {
        let (system, application, module) = DEMO_SYSTEMS[i % DEMO_SYSTEMS.len()];
        let (kind, tags, description) = DEMO_EVENTS[i % DEMO_EVENTS.len()];
        let timestamp = now - Duration::minutes(i as i64);
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            timestamp.to_rfc3339(),
            system,
            application,
            module,
            kind,
            tags,
            description,
        ])?;
    }

    info!(rows = count, "Demo log rows inserted");
    Ok(count)
}
