//! Backup Tools - Main entry point
//!
//! Runs incremental directory backups on a cron schedule, or once with `--once`.

use anyhow::Result;
use backup_tools::daemon::scheduler::BackupScheduler;
use backup_tools::daemon::shutdown;
use backup_tools::{utils, BackupRunner, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file (environment is used otherwise)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single backup and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting backup-tools v{} (source: {}, output: {})",
        env!("CARGO_PKG_VERSION"),
        config.source_path.display(),
        config.output_path.display()
    );

    if !config.source_path.is_dir() {
        tracing::warn!(
            source = %config.source_path.display(),
            "Source path is not a readable directory yet; runs will fail until it is"
        );
    }

    let cron_expression = config.cron_expression.clone();
    let runner = Arc::new(BackupRunner::new(Arc::new(config)));

    if args.once {
        let summary = runner.run().await?;
        tracing::info!("Backup finished: {}", summary);
        return Ok(());
    }

    // Invalid schedule is the one configuration problem we cannot recover from
    let scheduler = BackupScheduler::new(runner).await?;
    scheduler.schedule(&cron_expression).await?;
    scheduler.start().await?;
    tracing::info!(cron = %cron_expression, "Scheduler started");

    shutdown::wait_for_signal().await?;

    scheduler.shutdown().await?;
    tracing::info!("Shutdown complete");

    Ok(())
}
