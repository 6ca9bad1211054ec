//! Command-line entry point.
//!
//! Reads configuration from the environment and either runs the backup on
//! its schedule (default) or performs a single run with `--once`.

use anyhow::Context;
use clap::Parser;
use logicapps_backup::{BackupPipeline, Config, RunOutcome, Scheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "logicapps-backup", version, about)]
struct Cli {
    /// Run a single backup and exit instead of starting the scheduler.
    #[arg(long)]
    once: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = Config::from_env().context("loading configuration from environment")?;
    let pipeline = BackupPipeline::from_config(config).context("building backup pipeline")?;

    if cli.once {
        let report = pipeline.run().await?;
        info!(report = %serde_json::to_string(&report)?, "backup report");
        if report.outcome == RunOutcome::PartialSuccess {
            anyhow::bail!("{} workflow(s) failed", report.failures.len());
        }
        return Ok(());
    }

    let scheduler = Scheduler::from_config(pipeline.config());
    let pipeline = &pipeline;
    scheduler
        .run_until(
            move || async move {
                match pipeline.run().await {
                    Ok(report) => match serde_json::to_string(&report) {
                        Ok(json) => info!(report = %json, "backup report"),
                        Err(e) => error!(error = %e, "could not serialize backup report"),
                    },
                    Err(e) => error!(error = %e, fatal = e.is_fatal(), "backup run failed"),
                }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await;

    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("logicapps_backup={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
