//! Chainwatch - blockchain infrastructure monitor
//!
//! Polls node health endpoints, token prices and contract events, and
//! sends throttled Telegram alerts.

mod alerting;
mod commands;
mod config;
mod error;
mod pollers;
mod tasks;
mod watcher;

use alerting::Alerters;
use chainwatch_alerts::{PriceAlert, PriceAlertKind, ServiceStatus};
use chainwatch_events::{EventListener, EventStore, JsonRpcClient};
use chainwatch_feeds::{HealthChecker, PriceFetcher};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::SyncStart;
use config::AppConfig;
use error::AppError;
use futures_util::future::join_all;
use pollers::{EventPoller, HealthPoller, MaintenancePoller, PricePoller};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tasks::ScheduledTask;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use watcher::ConfigWatcher;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Chainwatch CLI
#[derive(Parser, Debug)]
#[command(name = "chainwatch")]
#[command(about = "Blockchain infrastructure monitor with Telegram alerts", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Start all monitors (default)
    Run,
    /// Send a test message through every configured alert channel
    TestTelegram,
    /// Run one health check pass and print the results
    Check,
    /// Fetch and print the current price
    Price,
    /// Store contract events from a historical block range
    Sync {
        /// First block to scan
        #[arg(long, conflicts_with = "since", required_unless_present = "since")]
        from_block: Option<u64>,
        /// Start at the first block at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Last block to scan (default: latest confirmed)
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// Print the most recent stored events
    Events {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn service_status(config: &AppConfig, status: ServiceStatus, host: &str) -> PriceAlert {
    PriceAlert::new(
        &config.price.token_id,
        &config.price.vs_currency,
        Utc::now(),
        PriceAlertKind::ServiceStatus {
            status,
            host: host.to_string(),
        },
    )
}

async fn run(config_path: PathBuf, config: AppConfig) -> Result<(), AppError> {
    let host = host_name();
    let alerters = Alerters::from_config(&config)?;

    info!("🚀 Chainwatch starting on {}", host);
    info!("  Networks: {}", config.networks.len());
    info!("  Health checks: {}", config.health.enabled);
    info!(
        "  Price monitor: {} ({}/{})",
        config.price.enabled, config.price.token_id, config.price.vs_currency
    );
    info!("  Event listener: {}", config.events.enabled);

    let (config_tx, config_rx) = watch::channel(Arc::new(config.clone()));
    let mut tasks = Vec::new();

    tasks.push(ScheduledTask::spawn(
        HealthPoller::new(
            config_rx.clone(),
            HealthChecker::new(config.health.timeout())?,
            alerters.health.clone(),
        ),
        config.health.interval(),
    ));

    tasks.push(ScheduledTask::spawn(
        PricePoller::new(
            config_rx.clone(),
            PriceFetcher::new(config.price.timeout())?,
            alerters.price.clone(),
            alerters.generic.clone(),
        ),
        config.price.interval(),
    ));

    if config.events.enabled {
        let store = EventStore::connect(&config.database_url).await?;
        let client = JsonRpcClient::new(&config.events.rpc_url, config.events.timeout())?;
        let listener = EventListener::new(client, store, &config.events);
        tasks.push(ScheduledTask::spawn(
            EventPoller::new(listener, config.events.notify, alerters.generic.clone()),
            config.events.interval(),
        ));
    }

    tasks.push(ScheduledTask::spawn(
        ConfigWatcher::new(config_path, config_tx, alerters.price.clone()),
        config.config_watch_interval(),
    ));

    tasks.push(ScheduledTask::spawn(
        MaintenancePoller::new(alerters.clone()),
        config.maintenance_interval(),
    ));

    let names: Vec<_> = tasks.iter().map(ScheduledTask::name).collect();
    info!("  Tasks: {}", names.join(", "));

    alerters
        .price
        .send_alert(&service_status(&config, ServiceStatus::Started, &host))
        .await;

    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    warn!("Shutdown signal received");

    join_all(tasks.into_iter().map(|task| task.stop(SHUTDOWN_GRACE))).await;

    // Thresholds may have been reloaded, but the token is the same
    alerters
        .price
        .send_alert(&service_status(&config, ServiceStatus::Stopped, &host))
        .await;

    info!("👋 Chainwatch stopped");
    Ok(())
}

async fn dispatch(args: Args, config: AppConfig) -> Result<bool, AppError> {
    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(args.config, config).await.map(|_| true),
        Command::TestTelegram => commands::test_telegram(&config, &host_name()).await,
        Command::Check => commands::check(&config).await,
        Command::Price => commands::price(&config).await.map(|_| true),
        Command::Sync {
            from_block,
            since,
            to_block,
        } => {
            let start = match (from_block, since) {
                (Some(block), _) => SyncStart::Block(block),
                (None, Some(since)) => SyncStart::Since(since),
                (None, None) => {
                    return Err(AppError::Usage(
                        "either --from-block or --since is required".to_string(),
                    ))
                }
            };
            commands::sync(&config, start, to_block).await.map(|_| true)
        }
        Command::Events { limit } => commands::events(&config, limit).await.map(|_| true),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let loaded = AppConfig::load(&args.config).and_then(|c| c.validate().map(|_| c));

    let level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match dispatch(args, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
