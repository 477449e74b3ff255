//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex so one process-wide
//! connection can be reused sequentially across requests. Chat sessions open
//! the database read-only; `init` opens it read-write and runs migrations.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle, OpenFlags};
use tracing::info;

use crate::error::StorageError;
use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    read_only: bool,
}

impl Database {
    /// Open (or create) a database at the given path for writing.
    ///
    /// Configures WAL mode, synchronous=NORMAL, and runs all pending
    /// migrations.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StorageError::Open(format!("{}: {}", path.display(), e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| StorageError::Open(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self::wrap(conn, false);
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an existing database read-only.
    ///
    /// Fails if the file does not exist. Writes are refused by SQLite itself.
    pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Self, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StorageError::Open(format!("{}: {}", path.display(), e)))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| StorageError::Open(format!("Failed to set busy timeout: {}", e)))?;

        info!(path = %path.display(), "Database opened read-only");
        Ok(Self::wrap(conn, true))
    }

    /// Open an in-memory database with the schema applied (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Open(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self::wrap(conn, false);
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    fn wrap(conn: Connection, read_only: bool) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Mutex::new(conn),
            interrupt,
            read_only,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Abort the statement currently running on this connection, if any.
    ///
    /// Safe to call from another thread while a query holds the lock.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("read_only", &self.read_only)
            .finish()
    }
}
