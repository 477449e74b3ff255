//! Shared configuration, error types, domain types, and the SQL safety gate.

pub mod config;
pub mod error;
pub mod safety;
pub mod types;

pub use config::MagicSqlConfig;
pub use error::{MagicSqlError, Result};
pub use safety::{GateDecision, SqlClass, SqlGate};
pub use types::*;
