use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MagicSqlError, Result};
use crate::types::SqlDialect;

/// Top-level configuration for MagicSQL.
///
/// Loaded from `~/.magicsql/config.toml` by default. Secrets are never read
/// from this file: the model API key comes from the environment variable
/// named by [`ModelConfig::api_key_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MagicSqlConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl MagicSqlConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MagicSqlConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check the settings a session cannot run without.
    ///
    /// Does not look at the API key; see [`ModelConfig::resolve_api_key`].
    pub fn validate(&self) -> Result<()> {
        if self.model.provider != "openai" {
            return Err(MagicSqlError::Config(format!(
                "unsupported model provider: {}",
                self.model.provider
            )));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(MagicSqlError::Config("model.base_url is empty".to_string()));
        }
        if self.model.model.trim().is_empty() {
            return Err(MagicSqlError::Config("model.model is empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(MagicSqlError::Config(format!(
                "model.temperature must be within 0.0..=2.0, got {}",
                self.model.temperature
            )));
        }
        if self.model.timeout_secs == 0 || self.database.query_timeout_secs == 0 {
            return Err(MagicSqlError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.database.path.trim().is_empty() {
            return Err(MagicSqlError::Config("database.path is empty".to_string()));
        }
        if self.query.top_k == 0 || self.query.max_rows == 0 {
            return Err(MagicSqlError::Config(
                "query.top_k and query.max_rows must be at least 1".to_string(),
            ));
        }
        if self.memory.starter_message.trim().is_empty() {
            return Err(MagicSqlError::Config(
                "memory.starter_message is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider name. Only "openai" (any OpenAI-compatible endpoint) is supported.
    pub provider: String,
    /// Base URL of the chat-completions API.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Stream answer tokens to the terminal as they arrive.
    pub streaming: bool,
    /// Timeout for one model call in seconds.
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.0,
            streaming: true,
            timeout_secs: 60,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl ModelConfig {
    /// Read the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            Ok(_) => Err(MagicSqlError::Config(format!(
                "environment variable {} is empty",
                self.api_key_env
            ))),
            Err(_) => Err(MagicSqlError::Config(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))),
        }
    }
}

/// Target database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file holding the `Logs` table.
    pub path: String,
    /// Dialect the model is instructed to write.
    pub dialect: SqlDialect,
    /// Open the database read-only for chat sessions.
    pub read_only: bool,
    /// Timeout for one query in seconds.
    pub query_timeout_secs: u64,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Describe the schema from the live database instead of the builtin text.
    pub introspect_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "magicsql.db".to_string(),
            dialect: SqlDialect::Sqlite,
            read_only: true,
            query_timeout_secs: 60,
            busy_timeout_ms: 5_000,
            introspect_schema: false,
        }
    }
}

/// Query generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Row limit the model is told to apply.
    pub top_k: usize,
    /// Hard cap on rows read back from the database.
    pub max_rows: usize,
    /// Regeneration attempts after a failed execution (clamped to 1).
    pub max_regenerations: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_rows: 10,
            max_regenerations: 0,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum turns kept in memory; 0 keeps every turn.
    pub max_turns: usize,
    /// Assistant greeting that seeds a fresh conversation.
    pub starter_message: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 0,
            starter_message: "How can I help you?".to_string(),
        }
    }
}
