//! MagicSQL application binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize tracing
//! 3. Dispatch: `init` creates (and optionally seeds) the Logs database,
//!    `schema` prints the prompt schema, `chat` runs the terminal session.

mod cli;
mod terminal;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use magicsql_chat::{ChatSession, OrchestratorSettings, PromptComposer, QueryOrchestrator};
use magicsql_core::config::MagicSqlConfig;
use magicsql_core::SqlDialect;
use magicsql_llm::OpenAiClient;
use magicsql_storage::{seed_demo_logs, Database, QueryExecutor, SchemaDescriptor};

use cli::{CliArgs, Command};
use terminal::TerminalPresentation;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Expand ~ to the home directory in a path string.
fn resolve_path(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}

/// Open the configured database the way a chat session uses it.
fn open_database(config: &MagicSqlConfig, path: &Path) -> AppResult<Database> {
    if !path.exists() {
        tracing::error!(
            path = %path.display(),
            "Database not found. Run `magicsql init --demo` to create one"
        );
        return Err(format!("database {} does not exist", path.display()).into());
    }

    let db = if config.database.read_only {
        Database::open_read_only(path, Duration::from_millis(config.database.busy_timeout_ms))?
    } else {
        Database::new(path)?
    };
    tracing::info!(
        path = %path.display(),
        read_only = db.is_read_only(),
        "SQLite database opened"
    );
    Ok(db)
}

fn schema_for(config: &MagicSqlConfig, executor: &dyn QueryExecutor) -> SchemaDescriptor {
    if config.database.introspect_schema {
        SchemaDescriptor::from_executor(executor, config.database.dialect)
    } else {
        SchemaDescriptor::logs(config.database.dialect)
    }
}

fn run_init(config: &MagicSqlConfig, demo: bool, rows: usize) -> AppResult<()> {
    let path = resolve_path(&config.database.path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::new(&path)?;
    tracing::info!(path = %path.display(), "Logs table ready");

    if demo {
        let inserted = db.with_conn(|conn| seed_demo_logs(conn, rows))?;
        println!("Created {} with {} demo log entries.", path.display(), inserted);
    } else {
        println!("Created {} (empty Logs table).", path.display());
    }
    Ok(())
}

fn run_schema(config: &MagicSqlConfig) -> AppResult<()> {
    let schema = if config.database.introspect_schema {
        let path = resolve_path(&config.database.path);
        let db = open_database(config, &path)?;
        schema_for(config, &db)
    } else {
        SchemaDescriptor::logs(config.database.dialect)
    };
    println!("{}", schema.describe());
    Ok(())
}

async fn run_chat(config: &MagicSqlConfig, show_sql: bool) -> AppResult<()> {
    let api_key = config.model.resolve_api_key()?;

    let path = resolve_path(&config.database.path);
    let db = Arc::new(open_database(config, &path)?);
    if config.database.dialect == SqlDialect::MsSql {
        tracing::warn!(
            "Dialect is set to {} but the backend is SQLite; generated queries may fail",
            SqlDialect::MsSql.display_name()
        );
    }
    let schema = schema_for(config, db.as_ref());

    let model = Arc::new(OpenAiClient::new(
        api_key.clone(),
        config.model.model.clone(),
        &config.model.base_url,
        Duration::from_secs(config.model.timeout_secs),
    )?);
    tracing::info!(
        model = %model.model(),
        base_url = %model.base_url(),
        streaming = config.model.streaming,
        "Chat model ready"
    );

    let settings = OrchestratorSettings::from_config(config).with_secret(api_key);
    let orchestrator = QueryOrchestrator::new(model, db, settings);
    let composer = PromptComposer::new(config.database.dialect, config.query.top_k);

    let mut session = ChatSession::new(
        orchestrator,
        composer,
        schema,
        config.memory.max_turns,
        config.memory.starter_message.clone(),
    )
    .with_streaming(config.model.streaming);

    println!(
        "MagicSQL v{} - ask about the Logs table. /help lists commands.",
        env!("CARGO_PKG_VERSION")
    );
    let mut presentation = TerminalPresentation::stdio(show_sql);
    session.run(&mut presentation).await?;
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    // Config. A file that exists but does not parse is fatal.
    let config_file = args.resolve_config_path();
    let mut config = if config_file.exists() {
        MagicSqlConfig::load(&config_file)?
    } else {
        MagicSqlConfig::default()
    };
    args.apply_overrides(&mut config);

    // Tracing. Logs go to stderr so they never interleave with answers.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting MagicSQL v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), exists = config_file.exists(), "Config file");

    config.validate()?;

    match args.command() {
        Command::Init { demo, rows } => run_init(&config, demo, rows),
        Command::Schema => run_schema(&config),
        Command::Chat => run_chat(&config, args.show_sql).await,
    }
}
