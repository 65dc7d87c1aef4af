//! # hn-etl CLI
//!
//! Loads Hacker News items from BigQuery into PostgreSQL (or SQLite),
//! inserting each item id exactly once across any number of runs.
//!
//! ## Usage
//!
//! ```bash
//! hn-etl --config ./config/hn-etl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hn-etl init` | Create the destination table if it does not exist |
//! | `hn-etl sync` | Extract every titled item and insert the ones not yet loaded |
//! | `hn-etl get <id>` | Print one loaded record as JSON |
//! | `hn-etl stats` | Show row count and columns of the destination table |
//!
//! ## Environment
//!
//! - `GOOGLE_OAUTH_ACCESS_TOKEN`: BigQuery bearer token (name configurable).
//! - `HN_ETL_LOG`: log filter for diagnostics (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use hn_etl::config;
use hn_etl::get;
use hn_etl::ingest::{self, SyncOptions};
use hn_etl::migrate;
use hn_etl::progress::ProgressMode;
use hn_etl::stats;

/// hn-etl: idempotent Hacker News loader.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with `[source]` and `[destination]` sections.
#[derive(Parser)]
#[command(
    name = "hn-etl",
    about = "Idempotent extract-and-load of Hacker News items from BigQuery into a relational table",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hn-etl.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, otherwise `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Verbose diagnostic logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the destination table if it does not exist.
    ///
    /// Safe to run any number of times.
    Init,

    /// Extract all titled items and insert those not already loaded.
    ///
    /// Always re-scans the full source result set; ids already present in
    /// the destination are skipped, never updated.
    Sync {
        /// Extract and count records without writing to the destination.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of records to process.
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Print one loaded record by id.
    Get {
        /// Hacker News item id.
        id: i64,
    },

    /// Show destination table statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let env = env_logger::Env::default().filter_or("HN_ETL_LOG", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
            println!("Destination initialized.");
        }
        Commands::Sync { dry_run, limit } => {
            let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
            let options = SyncOptions { dry_run, limit };
            ingest::run_sync(&cfg, &options, Arc::from(mode.reporter())).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
