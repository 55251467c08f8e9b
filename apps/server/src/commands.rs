//! One-shot CLI commands.

use crate::alerting::Alerters;
use crate::config::{AppConfig, ConfigError};
use crate::error::AppError;
use chainwatch_core::HealthOutcome;
use chainwatch_events::{BlockSource, EventListener, EventStore, JsonRpcClient};
use chainwatch_feeds::{HealthChecker, PriceFetcher};
use chrono::{DateTime, TimeZone, Utc};
use tracing::info;

/// Send the canary message through each enabled alert component.
/// Returns false when any delivery failed or nothing is enabled.
pub async fn test_telegram(config: &AppConfig, host: &str) -> Result<bool, AppError> {
    let alerters = Alerters::from_config(config)?;
    let results = alerters.test_connections(host).await;

    if results.is_empty() {
        println!("No Telegram alert component is configured");
        return Ok(false);
    }
    for (domain, ok) in &results {
        println!("{:<8} {}", domain, if *ok { "ok" } else { "FAILED" });
    }
    Ok(results.iter().all(|(_, ok)| *ok))
}

/// One health check pass across all networks. Returns true when all are healthy.
pub async fn check(config: &AppConfig) -> Result<bool, AppError> {
    if config.networks.is_empty() {
        println!("No networks configured");
        return Ok(true);
    }

    let checker = HealthChecker::new(config.health.timeout())?;
    let results = checker.check_all(&config.networks).await;

    for result in &results {
        match &result.outcome {
            HealthOutcome::Healthy {
                response_time_ms,
                queue_size,
            } => {
                let queue = queue_size.map(|q| format!(" queue={}", q)).unwrap_or_default();
                println!("✅ {:<16} {}ms{}", result.network, response_time_ms, queue);
            }
            HealthOutcome::Unhealthy { reason, .. } => {
                println!("🔴 {:<16} {}", result.network, reason);
            }
        }
    }
    Ok(results.iter().all(|r| r.is_healthy()))
}

pub async fn price(config: &AppConfig) -> Result<(), AppError> {
    let fetcher = PriceFetcher::new(config.price.timeout())?;
    let quote = fetcher.fetch(&config.price).await?;
    println!(
        "{} = {} {}",
        quote.token,
        quote.price,
        quote.vs_currency.to_uppercase()
    );
    Ok(())
}

/// Where a historical sync starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStart {
    Block(u64),
    Since(DateTime<Utc>),
}

async fn open_listener(config: &AppConfig) -> Result<EventListener<JsonRpcClient>, AppError> {
    config.events.validate().map_err(ConfigError::Invalid)?;
    let store = EventStore::connect(&config.database_url).await?;
    let client = JsonRpcClient::new(&config.events.rpc_url, config.events.timeout())?;
    Ok(EventListener::new(client, store, &config.events))
}

/// Store contract events from a historical block range.
pub async fn sync(config: &AppConfig, start: SyncStart, to_block: Option<u64>) -> Result<(), AppError> {
    let listener = open_listener(config).await?;

    let from_block = match start {
        SyncStart::Block(block) => block,
        SyncStart::Since(since) => match listener.find_start_block(since).await? {
            Some(block) => {
                info!(%since, block, "Resolved start block");
                block
            }
            None => {
                println!("No block at or after {}", since);
                return Ok(());
            }
        },
    };

    let to_block = match to_block {
        Some(block) => block,
        None => listener
            .source()
            .latest_block()
            .await?
            .saturating_sub(config.events.confirmations),
    };

    if from_block > to_block {
        return Err(AppError::Usage(format!(
            "start block {} is after end block {}",
            from_block, to_block
        )));
    }

    let stored = listener.sync_range(from_block, to_block).await?;
    println!(
        "Stored {} new events from blocks {}..={}",
        stored, from_block, to_block
    );
    Ok(())
}

/// Print the most recent stored events.
pub async fn events(config: &AppConfig, limit: u32) -> Result<(), AppError> {
    let store = EventStore::connect(&config.database_url).await?;
    let events = store.recent_events(limit).await?;

    if events.is_empty() {
        println!("No events stored");
        return Ok(());
    }

    for event in events {
        let time = event
            .block_timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10} {} {} {}",
            event.block_number,
            time,
            event.id(),
            event.signature().unwrap_or("-")
        );
    }
    Ok(())
}
