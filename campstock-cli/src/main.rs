use anyhow::Result;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use campstock_sync::SyncEngine;

mod commands;
mod render;
mod settings;

use crate::settings::{AppConfig, LoggingConfig};

/// CampStock offline inventory log
#[derive(Parser, Debug)]
#[command(name = "campstock")]
#[command(version, about = "Offline-first inventory logging with background sync")]
struct Cli {
    /// Configuration file path (default: campstock.yaml if present)
    #[arg(short, long, env = "CAMPSTOCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Local database file, overriding the configuration
    #[arg(long, global = true)]
    db: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            render::failure(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref(), cli.db.as_deref())?;
    init_tracing(cli.verbose, &config.logging)?;

    tracing::debug!(db_path = %config.store.db_path, "Configuration loaded");

    let engine = SyncEngine::open(config.engine()).await?;
    let result = commands::run(cli.command, &engine).await;
    engine.close().await;

    result
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };

    let is_production = env::var("CAMPSTOCK_ENV").is_ok_and(|v| v == "production");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("campstock={level},campstock_sync={level},sqlx=warn").into()
    });

    if is_production || logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()?;
    } else {
        // Logs go to stderr so command output can be piped.
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}
