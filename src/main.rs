use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use skywatch::config::{LoggingConfig, SkywatchConfig, config_path};
use skywatch::log_format::init_logging;

mod commands;

use commands::{handle_archive, handle_backup, handle_history, handle_run, handle_stats};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// `git describe` output when built from a checkout, otherwise the crate version
fn version() -> &'static str {
    match option_env!("VERGEN_GIT_DESCRIBE") {
        Some(describe) if !describe.is_empty() && describe != "VERGEN_IDEMPOTENT_OUTPUT" => {
            describe
        }
        _ => env!("CARGO_PKG_VERSION"),
    }
}

#[derive(Parser)]
#[command(name = "skywatch")]
#[command(about = "Watch a local ADS-B receiver: sighting history, alerts and reports")]
#[command(version = version())]
struct Cli {
    /// Config file (defaults to $SKYWATCH_CONFIG, then ./skywatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed and raise alerts until interrupted
    Run,
    /// Show recent sightings
    History {
        /// Only this ICAO hex code
        #[arg(long)]
        hex: Option<String>,
        /// How far back to look
        #[arg(long, default_value = "7")]
        days: i64,
        /// Maximum rows to show
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// Move old sightings and weather samples into the archive tables
    Archive {
        /// Archive rows older than this many days (config: archive.max_age_days)
        #[arg(long)]
        days: Option<i64>,
        /// Rows moved per transaction (config: archive.batch_size)
        #[arg(long)]
        batch_size: Option<i64>,
    },
    /// Write a consistent copy of the database
    Backup {
        /// Target file; must not exist
        destination: Option<PathBuf>,
    },
    /// Show row counts, time ranges and database size
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = SkywatchConfig::load(&config_path(cli.config.as_deref()))?;
    config.apply_env();
    config.validate()?;

    // Only the long-running poller writes the log file the termination notice tails
    let logging = match cli.command {
        Commands::Run => config.logging.clone(),
        _ => LoggingConfig {
            file: None,
            ..config.logging.clone()
        },
    };
    init_logging(&logging)?;

    match cli.command {
        Commands::Run => handle_run(config, version()).await,
        Commands::History { hex, days, limit } => {
            handle_history(&config, hex, days, limit).await
        }
        Commands::Archive { days, batch_size } => handle_archive(&config, days, batch_size).await,
        Commands::Backup { destination } => handle_backup(&config, destination).await,
        Commands::Stats => handle_stats(&config).await,
    }
}
