//! # Time Capture Main Entry Point
//!
//! `serve` (default) runs the HTTP API with the scheduler and worker pool,
//! `migrate` applies migrations and `sync <user-id>` runs one job inline.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use timecapture::{
    config::{AppConfig, ConfigLoader},
    db,
    handlers::jobs::JobInfo,
    server::{AppState, run_server},
    telemetry,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "timecapture", about = "Billable time capture service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API, sync scheduler, worker pool and token refresher
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Run one sync job for a user and print the outcome as JSON
    Sync {
        /// User to sync
        user_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Loaded configuration");
    }
    tracing::info!(profile = %config.profile, "Configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::Sync { user_id } => sync_once(config, user_id).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let crypto_key = config.check_crypto_key()?;
    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;
    run_server(config, db, crypto_key).await
}

async fn migrate(config: AppConfig) -> Result<()> {
    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await
}

async fn sync_once(config: AppConfig, user_id: Uuid) -> Result<()> {
    let crypto_key = config.check_crypto_key()?;
    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    let state = AppState::new(Arc::new(config), Arc::new(db), crypto_key)?;
    let job = state.executor().run_inline(user_id).await?;

    let output = serde_json::to_string_pretty(&JobInfo::from(job))
        .context("serializing job outcome")?;
    println!("{}", output);
    Ok(())
}
