//! MagicSQL Storage crate - SQLite access to the `Logs` table.
//!
//! Provides the connection wrapper with migrations, the read-only
//! `QueryExecutor` capability used by the chat orchestrator, and the
//! Schema Descriptor embedded in prompts.

pub mod db;
pub mod error;
pub mod executor;
pub mod migrations;
pub mod schema;

pub use db::Database;
pub use error::StorageError;
pub use executor::QueryExecutor;
pub use migrations::seed_demo_logs;
pub use schema::SchemaDescriptor;
