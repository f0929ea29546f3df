//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `sso_landscape` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Dispatch to the `consume`, `analyze`, and `send` subcommands
//!
//! All core functionality is implemented in the library crate.

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use sso_landscape::config::SendOptions;
use sso_landscape::initialization::init_logger_with;
use sso_landscape::queue::{AmqpConnector, ConnectionPool, PoolSettings, QueueClient};
use sso_landscape::{run_analysis, run_consumer, Command, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let opt = Opt::parse();
    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    let result = match opt.command {
        Command::Consume(opts) => run_consumer(opts).await,
        Command::Analyze(opts) => run_analysis(&opts).await,
        Command::Send(opts) => send_task(opts).await,
    };

    if let Err(e) = result {
        eprintln!("sso_landscape error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

/// Publishes a task file and prints the `{success, error, data}` outcome.
async fn send_task(opts: SendOptions) -> Result<()> {
    let raw = tokio::fs::read(&opts.file)
        .await
        .with_context(|| format!("Failed to read task file {}", opts.file.display()))?;
    let payload: serde_json::Value =
        serde_json::from_slice(&raw).context("Task file is not valid JSON")?;

    let settings = PoolSettings {
        capacity: 1,
        ..PoolSettings::default()
    };
    let pool = ConnectionPool::new(Arc::new(AmqpConnector::new(opts.broker.uri())), settings).await;
    let client = QueueClient::new(Arc::clone(&pool));
    let outcome = client
        .send(&opts.queue, &opts.reply_to, &opts.correlation_id, &payload)
        .await;
    pool.close().await;

    println!("{}", serde_json::to_string(&outcome)?);
    if !outcome.success {
        process::exit(1);
    }
    Ok(())
}
