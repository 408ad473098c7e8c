mod engine;

use anyhow::{Context, Result};
use clap::Parser;
use mtnstat_cache::{cache_sweep_interval, Aggregator, NullSnowTelemetryProvider, NullWeatherProvider};
use mtnstat_config::ConfigRegistry;
use mtnstat_orchestrator::Orchestrator;
use mtnstat_storage::{PostgresStore, StatusStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use engine::ScraperEngine;

/// CLI entrypoint standing in for the cron-invoked trigger: runs once or
/// loops, scraping configured mountains and persisting normalized status.
#[derive(Parser, Debug)]
#[command(name = "scraper-engine", version, about)]
struct Args {
    /// Run a single pass and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Scrape a single mountain id and exit.
    #[arg(long)]
    mountain: Option<String>,

    /// Scrape only mountains tagged with this batch number.
    #[arg(long)]
    batch: Option<u32>,

    #[arg(long, env = "CONFIG_DIR", default_value = "config/mountains")]
    config_dir: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 900)]
    poll_interval_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;

    let registry = Arc::new(
        ConfigRegistry::load(&args.config_dir)
            .with_context(|| format!("loading mountain configs from {}", args.config_dir.display()))?,
    );
    info!(count = registry.all().len(), "loaded mountain configs");

    let pg = PostgresStore::connect(&args.database_url)
        .await
        .context("connecting to storage backend")?;
    pg.migrate().await.context("running storage migrations")?;
    let store: Arc<dyn StatusStore> = Arc::new(pg);

    let orchestrator =
        Orchestrator::new(registry.clone(), store.clone()).context("constructing orchestrator")?;

    let aggregator = Aggregator::new(
        registry.clone(),
        store.clone(),
        Arc::new(NullWeatherProvider),
        Arc::new(NullSnowTelemetryProvider),
    );

    let engine = ScraperEngine::new(registry, store, orchestrator, aggregator);

    if let Some(id) = &args.mountain {
        let outcome = engine.run_one(id).await?;
        info!(
            mountain_id = %id,
            run_id = %outcome.run_id,
            successful = outcome.successful,
            failed = outcome.failed,
            "single-mountain run complete"
        );
        return Ok(());
    }

    if let Some(batch) = args.batch {
        let outcome = engine.run_batch(batch).await?;
        info!(batch, successful = outcome.successful, failed = outcome.failed, "batch run complete");
        return Ok(());
    }

    if args.once {
        let outcome = engine.run_all().await?;
        info!(successful = outcome.successful, failed = outcome.failed, "run complete");
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(());
            }
        }
    });

    run_forever(&engine, Duration::from_secs(args.poll_interval_secs), &mut shutdown_rx).await;

    Ok(())
}

async fn run_forever(
    engine: &ScraperEngine,
    poll_interval: Duration,
    shutdown: &mut broadcast::Receiver<()>,
) {
    let mut sweep_tick = tokio::time::interval(cache_sweep_interval());
    sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("stopping run loop");
                break;
            }
            _ = sweep_tick.tick() => {
                engine.sweep_cache();
            }
            _ = tokio::time::sleep(poll_interval) => {
                match engine.run_all().await {
                    Ok(outcome) => info!(
                        successful = outcome.successful,
                        failed = outcome.failed,
                        duration_ms = outcome.duration_ms,
                        "scheduled run complete"
                    ),
                    Err(e) => error!(error = %e, "scheduled run failed"),
                }

                match engine.cleanup().await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            info!(deleted, "retention cleanup removed old records");
                        }
                    }
                    Err(e) => warn!(error = %e, "retention cleanup failed"),
                }
            }
        }
    }
}
