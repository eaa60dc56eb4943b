//! Offline Sync - inspect and drive the local mutation queue from a shell.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sync_config_and_utils::{init_logging_in, Config, Paths};

/// Offline sync command-line interface.
#[derive(Parser)]
#[command(name = "offline-sync")]
#[command(about = "Inspect and replay the offline mutation queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (database, logs, config). Defaults to ~/.offline-sync
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print queue counts, last sync time and storage mode
    Status,
    /// List mutations still eligible for replay
    Pending,
    /// List mutations that reached max retries
    Failed,
    /// Reset failed mutations and run one drain
    RetryFailed,
    /// Remove a queued mutation
    Discard {
        /// Queue id
        id: i64,
    },
    /// Delete retained synced records
    PurgeSynced,
    /// List open conflicts
    Conflicts,
    /// Settle one conflict
    Resolve {
        /// Conflict id
        id: String,
        side: Side,
    },
    /// Settle every open conflict the same way
    ResolveAll { side: Side },
    /// Probe connectivity once, then run one drain
    Sync,
    /// Keep probing connectivity and drain in the background until Ctrl-C
    Run,
}

/// Which side of a conflict wins.
#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Local,
    Server,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    // Initialize logging; stdout is reserved for command output
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging_in(&paths, level, false);

    let engine = app::Engine::open(&config, &paths).await?;

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => engine.status().await?,
        Commands::Pending => engine.pending().await?,
        Commands::Failed => engine.failed().await?,
        Commands::RetryFailed => engine.retry_failed().await?,
        Commands::Discard { id } => engine.discard(id).await?,
        Commands::PurgeSynced => engine.purge_synced().await?,
        Commands::Conflicts => engine.conflicts().await?,
        Commands::Resolve { id, side } => engine.resolve(&id, side).await?,
        Commands::ResolveAll { side } => engine.resolve_all(side).await?,
        Commands::Sync => engine.sync().await?,
        Commands::Run => engine.run().await?,
    }

    Ok(())
}
