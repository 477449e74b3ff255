//! CLI argument definitions for the MagicSQL application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use magicsql_core::config::MagicSqlConfig;
use std::path::PathBuf;

/// MagicSQL: ask questions about the Logs table in plain language.
#[derive(Parser, Debug)]
#[command(name = "magicsql", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database holding the Logs table.
    #[arg(short = 'd', long = "database", global = true)]
    pub database: Option<PathBuf>,

    /// Chat model name (e.g. gpt-4).
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Print the SQL behind each answer.
    #[arg(long = "show-sql")]
    pub show_sql: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start an interactive chat session (default).
    Chat,
    /// Create the Logs table, optionally filled with demo rows.
    Init {
        /// Insert synthetic log entries.
        #[arg(long)]
        demo: bool,
        /// Number of demo rows to insert.
        #[arg(long, default_value_t = 200)]
        rows: usize,
    },
    /// Print the schema text embedded in prompts.
    Schema,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MAGICSQL_CONFIG env var > platform default (~/.magicsql/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("MAGICSQL_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut MagicSqlConfig) {
        if let Some(ref db) = self.database {
            config.database.path = db.to_string_lossy().to_string();
        }
        if let Some(ref model) = self.model {
            config.model.model = model.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".magicsql").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".magicsql").join("config.toml");
    }
    PathBuf::from("config.toml")
}
