//! Error types for the storage layer.

/// Errors from opening, migrating, or querying the database.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open database: {0}")]
    Open(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("statement is not read-only")]
    NotReadOnly,
    #[error("query timed out after {0} seconds")]
    Timeout(u64),
    #[error("database lock poisoned: {0}")]
    Lock(String),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Query(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        assert_eq!(
            StorageError::Query("no such column: Foo".to_string()).to_string(),
            "query failed: no such column: Foo"
        );
        assert_eq!(
            StorageError::Timeout(60).to_string(),
            "query timed out after 60 seconds"
        );
        assert_eq!(StorageError::NotReadOnly.to_string(), "statement is not read-only");
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: StorageError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StorageError::Query(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(err.to_string().contains("denied"));
    }
}
