//! social-send - Scheduler daemon for queued posts
//!
//! Publishes posts from the queue when they become due, marking each one
//! published or failed. Failed posts are not retried.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use libsocialcast::credentials::CredentialSource;
use libsocialcast::{
    AdapterRegistry, Config, CredentialResolver, CycleReport, Database, PostStore, Scheduler,
    SchedulerSettings, SocialcastError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "social-send")]
#[command(version)]
#[command(about = "Scheduler daemon that publishes queued posts")]
#[command(long_about = "\
social-send - Scheduler daemon for queued posts

DESCRIPTION:
    social-send checks the Socialcast queue on a fixed interval and
    publishes every post whose scheduled time has passed. Each post is
    marked published or failed with the platform's message; one failing
    post never stops the others. Failed posts are not retried.

    Scheduled posting needs the database. With USE_DATABASE disabled the
    daemon still runs but does nothing.

USAGE:
    # Run in foreground (logs to stderr)
    social-send

    # Check every 30 seconds
    social-send --interval 30

    # Publish whatever is due right now and exit
    social-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Database location:  ~/.local/share/socialcast/posts.db

    [scheduler]
    interval_secs = 60  # seconds between queue checks

    Override with environment variables:
        SOCIALCAST_CONFIG   - Path to config file
        USE_DATABASE        - Enable database persistence
        SCHEDULER_INTERVAL  - Seconds between queue checks

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
")]
struct Cli {
    /// Seconds between queue checks (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Process due posts once and exit
    #[arg(long)]
    once: bool,

    /// Output format for --once (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libsocialcast::logging::init_with_verbosity(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<SocialcastError>()
            .map(SocialcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let json = match cli.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            return Err(SocialcastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            ))
            .into())
        }
    };

    let config = Config::load()?;
    let scheduler = build_scheduler(&config, cli.interval).await?;

    if cli.once {
        let report = scheduler.run_cycle(Utc::now()).await;
        print_report(&report, json)?;
        return Ok(());
    }

    info!(
        interval_secs = scheduler.settings().interval.as_secs(),
        "social-send daemon starting"
    );
    let handle = scheduler.start();

    wait_for_shutdown()
        .await
        .context("Failed to install signal handlers")?;

    handle.stop().await;
    info!("social-send daemon stopped");
    Ok(())
}

async fn build_scheduler(config: &Config, interval: Option<u64>) -> anyhow::Result<Scheduler> {
    let mut settings = SchedulerSettings::from_config(config);
    if let Some(secs) = interval {
        settings.interval = Duration::from_secs(secs.max(1));
    }

    let (store, credentials): (Arc<dyn PostStore>, Arc<CredentialResolver>) =
        if settings.persistence_enabled {
            let db = Arc::new(
                Database::new(&config.database.path)
                    .await
                    .with_context(|| format!("Failed to open database {}", config.database.path))?,
            );
            let credentials = CredentialResolver::from_config(
                config,
                Some(Arc::clone(&db) as Arc<dyn CredentialSource>),
            );
            (db as Arc<dyn PostStore>, Arc::new(credentials))
        } else {
            warn!("USE_DATABASE is disabled; scheduled posting is inactive");
            // Never read: cycles are skipped while persistence is disabled
            let placeholder = Arc::new(Database::in_memory().await?);
            (
                placeholder as Arc<dyn PostStore>,
                Arc::new(CredentialResolver::from_config(config, None)),
            )
        };

    let registry = Arc::new(AdapterRegistry::with_defaults(config, Arc::clone(&credentials))?);
    Ok(Scheduler::new(store, credentials, registry, settings))
}

fn print_report(report: &CycleReport, json: bool) -> anyhow::Result<()> {
    if json {
        let output = serde_json::json!({
            "attempted": report.attempted,
            "published": report.published,
            "failed": report.failed,
            "skipped": report.skipped,
            "status_update_errors": report.status_update_errors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if report.skipped {
        println!("Skipped: persistence is disabled");
    } else {
        println!(
            "Attempted: {}, Published: {}, Failed: {}",
            report.attempted, report.published, report.failed
        );
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    if let Some(signal) = signals.next().await {
        info!(signal, "Received shutdown signal, stopping gracefully...");
    }
    handle.close();
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
