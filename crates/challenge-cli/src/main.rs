// Challenge store entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (log to file, stdout carries command output)
// 3. Load config
// 4. Open database and the requested domain's store
// 5. Run the command

mod cli;
mod commands;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use challenge_store::config;
use challenge_store::db::SqliteStore;
use challenge_store::schema::EntrySchema;
use challenge_store::store::LocalStore;
use challenge_store::sync::{HttpTransport, SyncAdapter};

use crate::cli::{Cli, Commands, GameCommand, PenaltyCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse arguments
    let cli = Cli::parse();
    let home = match cli.home {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    // 2. Initialize tracing
    init_tracing(&home)?;
    info!("challenge starting in {}", home.display());

    // 3. Load config
    let config = config::load_config(&home).context("failed to load configuration")?;
    info!("Config loaded: server={}", config.server.base_url);

    // 4. Open database
    let db_path = home.join(&config.storage.path);
    let db_path = db_path.to_str().context("database path is not valid UTF-8")?;
    let kv = Arc::new(SqliteStore::open(db_path).context("failed to open database")?);
    info!("Database opened at {db_path}");

    let sync = SyncAdapter::new(HttpTransport::from_config(&config), config.endpoints.clone());

    // 5. Run the command
    match cli.command {
        Commands::Games { command } => {
            let store = open_store(&kv)?;
            match command {
                GameCommand::Common(common) => commands::run_common(&store, &sync, common).await?,
                GameCommand::Entries { command } => commands::run_game_entries(&store, command)?,
                GameCommand::Draw { tab, seed } => commands::draw_game(&store, &tab, seed)?,
            }
        }
        Commands::Penalties { command } => {
            let store = open_store(&kv)?;
            match command {
                PenaltyCommand::Common(common) => commands::run_common(&store, &sync, common).await?,
                PenaltyCommand::Entries { command } => commands::run_penalty_entries(&store, command)?,
            }
        }
        Commands::Spin { tab, players, seed } => {
            let store = open_store(&kv)?;
            commands::spin_wheel(&store, &tab, &players, seed)?;
        }
    }

    Ok(())
}

fn open_store<E: EntrySchema>(kv: &Arc<SqliteStore>) -> anyhow::Result<LocalStore<E, SqliteStore>> {
    LocalStore::open(Arc::clone(kv)).with_context(|| format!("failed to initialize {} storage", E::domain().kind))
}

/// Initialize tracing to append to `logs/challenge.log` under `home`.
fn init_tracing(home: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = home.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("challenge.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("challenge=info,challenge_store=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
