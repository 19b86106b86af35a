//! CLI Command Handlers
//!
//! Argument definitions and the handlers behind them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

use crate::application::{build_scheduler, open_store, StatsSnapshot};
use crate::config::{load_config, Config};

/// Market Harvester - Solana market data poller for Birdeye and Dexscreener
#[derive(Parser, Debug)]
#[command(
    name = "market-harvester",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Polls Birdeye and Dexscreener and stores Solana market data in SQLite",
    long_about = "Runs one periodic poller per configured job, discovers new tokens and \
                  wallets from their output, fetches details for every new discovery and \
                  upserts everything into a SQLite database."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the polling loops
    Run(RunCmd),

    /// Load and validate a configuration file, then print the job plan
    CheckConfig(CheckConfigCmd),
}

/// Start polling
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/harvester.toml")]
    pub config: PathBuf,

    /// Run a single cycle of every job, wait for dependent tasks and exit
    #[arg(long)]
    pub once: bool,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/harvester.toml")]
    pub config: PathBuf,
}

/// RUST_LOG wins, then the flags, then the configured level
pub fn log_filter(verbose: bool, debug: bool, configured: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_logging(app: &CliApp, config: &Config) {
    let filter = log_filter(app.verbose, app.debug, &config.logging.level);
    // Ignore a second init (tests, embedding)
    fmt().with_env_filter(filter).try_init().ok();
}

fn load(path: &Path) -> Result<Config> {
    load_config(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Execute the parsed command
pub async fn execute(app: CliApp) -> Result<()> {
    match &app.command {
        Command::Run(cmd) => {
            let config = load(&cmd.config)?;
            init_logging(&app, &config);
            run_command(cmd, &config).await
        }
        Command::CheckConfig(cmd) => {
            let config = load(&cmd.config)?;
            init_logging(&app, &config);
            check_config_command(&config)
        }
    }
}

async fn run_command(cmd: &RunCmd, config: &Config) -> Result<()> {
    tracing::info!("Starting market harvester...");

    let store = open_store(config).context("Failed to open database")?;
    let scheduler = build_scheduler(config, store).context("Failed to build scheduler")?;

    if cmd.once {
        let stats = scheduler.run_once().await.context("Single cycle failed")?;
        print_stats(&stats)?;
        return Ok(());
    }

    let handle = scheduler.start().context("Failed to start scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received");

    let stats = handle.shutdown().await;
    print_stats(&stats)?;
    tracing::info!("Market harvester stopped");
    Ok(())
}

fn check_config_command(config: &Config) -> Result<()> {
    println!("Configuration OK");
    println!(
        "Database: {}",
        if config.database.is_in_memory() {
            "in memory".to_string()
        } else {
            config.database.resolved_path().display().to_string()
        }
    );
    println!("First cycle: {:?}", config.scheduler.first_cycle);
    println!("Max dependent tasks: {}", config.scheduler.max_concurrent_tasks);
    println!();
    println!("{:<28} {:>8} {:>10} {:>9} {:>9}", "JOB", "ENABLED", "INTERVAL", "PAGE", "PAGES");
    for job in config.job_settings() {
        println!(
            "{:<28} {:>8} {:>9}s {:>9} {:>9}",
            job.kind.name(),
            job.enabled,
            job.interval_secs,
            job.page_size,
            job.max_pages
        );
    }
    println!();
    println!(
        "Tracked: {} tokens, {} wallets",
        config.tracking.tokens.len(),
        config.tracking.wallets.len()
    );
    Ok(())
}

fn print_stats(stats: &StatsSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(stats).context("Failed to serialise stats")?;
    println!("{}", json);
    Ok(())
}
