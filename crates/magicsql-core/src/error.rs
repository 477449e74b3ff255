use thiserror::Error;

/// Top-level error type for MagicSQL.
///
/// Subsystem crates define their own error types; this one covers the
/// shared concerns (configuration, I/O, serialization) and is what startup
/// code reports before any session is served.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MagicSqlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MagicSqlError {
    fn from(err: toml::de::Error) -> Self {
        MagicSqlError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MagicSqlError {
    fn from(err: toml::ser::Error) -> Self {
        MagicSqlError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MagicSqlError {
    fn from(err: serde_json::Error) -> Self {
        MagicSqlError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for MagicSQL operations.
pub type Result<T> = std::result::Result<T, MagicSqlError>;
