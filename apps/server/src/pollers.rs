//! Pollers driven by [`ScheduledTask`](crate::tasks::ScheduledTask).

use crate::alerting::Alerters;
use crate::config::AppConfig;
use crate::tasks::Poller;
use async_trait::async_trait;
use chainwatch_alerts::{GenericAlert, GenericAlerter, HealthAlert, HealthAlerter, PriceAlerter};
use chainwatch_core::HealthCheckResult;
use chainwatch_events::{BlockSource, EventListener};
use chainwatch_feeds::{HealthChecker, HealthTracker, PriceFetcher, PriceTracker};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub type ConfigReceiver = watch::Receiver<Arc<AppConfig>>;

/// Checks every configured network and alerts on state changes.
pub struct HealthPoller {
    config: ConfigReceiver,
    checker: HealthChecker,
    trackers: HashMap<String, HealthTracker>,
    alerter: Arc<HealthAlerter>,
}

impl HealthPoller {
    pub fn new(config: ConfigReceiver, checker: HealthChecker, alerter: Arc<HealthAlerter>) -> Self {
        Self {
            config,
            checker,
            trackers: HashMap::new(),
            alerter,
        }
    }

    /// Fold results into the per-network trackers and collect the alerts.
    fn evaluate(&mut self, config: &AppConfig, results: &[HealthCheckResult]) -> Vec<HealthAlert> {
        // Forget networks removed by a config reload
        self.trackers
            .retain(|name, _| config.networks.iter().any(|n| &n.name == name));

        let mut alerts = Vec::new();
        for (target, result) in config.networks.iter().zip(results) {
            if result.is_healthy() {
                debug!(network = %target.name, response_ms = ?result.response_time_ms(), "Network healthy");
            } else {
                warn!(network = %target.name, outcome = ?result.outcome, "Network unhealthy");
            }

            let tracker = self.trackers.entry(target.name.clone()).or_default();
            alerts.extend(tracker.observe(
                result,
                target,
                config.health.consecutive_failure_threshold,
            ));
        }
        alerts
    }
}

#[async_trait]
impl Poller for HealthPoller {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn tick(&mut self) {
        let config = self.config.borrow().clone();
        if !config.health.enabled || config.networks.is_empty() {
            return;
        }

        let results = self.checker.check_all(&config.networks).await;
        for alert in self.evaluate(&config, &results) {
            self.alerter.send_alert(&alert).await;
        }
    }
}

/// Fetches the token price and alerts on moves and threshold crossings.
pub struct PricePoller {
    config: ConfigReceiver,
    fetcher: PriceFetcher,
    tracker: PriceTracker,
    alerter: Arc<PriceAlerter>,
    generic: Arc<GenericAlerter>,
}

impl PricePoller {
    pub fn new(
        config: ConfigReceiver,
        fetcher: PriceFetcher,
        alerter: Arc<PriceAlerter>,
        generic: Arc<GenericAlerter>,
    ) -> Self {
        Self {
            config,
            fetcher,
            tracker: PriceTracker::new(),
            alerter,
            generic,
        }
    }
}

#[async_trait]
impl Poller for PricePoller {
    fn name(&self) -> &'static str {
        "price"
    }

    async fn tick(&mut self) {
        let config = self.config.borrow().clone();
        let settings = &config.price;
        if !settings.enabled {
            return;
        }

        match self.fetcher.fetch(settings).await {
            Ok(quote) => {
                debug!(token = %quote.token, price = quote.price, "Price fetched");
                for alert in self.tracker.observe(&quote, settings) {
                    self.alerter.send_alert(&alert).await;
                }
            }
            Err(e) => {
                warn!(token = %settings.token_id, error = %e, "Price fetch failed");
                if !e.is_transient() {
                    let alert = GenericAlert::error("price", "Price fetch failed", e.to_string());
                    self.generic.send_alert(&alert).await;
                }
            }
        }
    }
}

/// Polls the chain for new contract events.
pub struct EventPoller<S> {
    listener: EventListener<S>,
    notify: bool,
    generic: Arc<GenericAlerter>,
}

impl<S: BlockSource> EventPoller<S> {
    pub fn new(listener: EventListener<S>, notify: bool, generic: Arc<GenericAlerter>) -> Self {
        Self {
            listener,
            notify,
            generic,
        }
    }
}

#[async_trait]
impl<S: BlockSource + 'static> Poller for EventPoller<S> {
    fn name(&self) -> &'static str {
        "events"
    }

    async fn tick(&mut self) {
        match self.listener.poll().await {
            Ok(events) => {
                if !self.notify {
                    return;
                }
                for event in events {
                    let alert = GenericAlert::contract_event("events", event);
                    self.generic.send_alert(&alert).await;
                }
            }
            Err(e) => {
                error!(error = %e, "Event poll failed");
                let alert = GenericAlert::error("events", "Event listener error", e.to_string());
                self.generic.send_alert(&alert).await;
            }
        }
    }
}

/// Drops expired throttle entries.
pub struct MaintenancePoller {
    alerters: Alerters,
}

impl MaintenancePoller {
    pub fn new(alerters: Alerters) -> Self {
        Self { alerters }
    }
}

#[async_trait]
impl Poller for MaintenancePoller {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn tick(&mut self) {
        let removed = self.alerters.prune(Utc::now());
        if removed > 0 {
            info!(removed, "Pruned expired throttle entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch_alerts::HealthAlertKind;
    use chainwatch_core::{HealthOutcome, UnhealthyReason};
    use chainwatch_feeds::NetworkTarget;
    use chrono::{DateTime, Duration};
    use pretty_assertions::assert_eq;

    fn network(name: &str) -> NetworkTarget {
        NetworkTarget {
            name: name.to_string(),
            health_url: format!("https://{}.example.com/health", name),
            max_response_ms: None,
            queue_warning_threshold: None,
        }
    }

    fn failure(name: &str, at: DateTime<Utc>) -> HealthCheckResult {
        HealthCheckResult::new(
            name,
            at,
            HealthOutcome::Unhealthy {
                reason: UnhealthyReason::Timeout,
                response_time_ms: None,
            },
        )
    }

    fn healthy(name: &str, at: DateTime<Utc>) -> HealthCheckResult {
        HealthCheckResult::new(
            name,
            at,
            HealthOutcome::Healthy {
                response_time_ms: 42,
                queue_size: None,
            },
        )
    }

    fn poller(config: AppConfig) -> (HealthPoller, watch::Sender<Arc<AppConfig>>) {
        let alerters = Alerters::from_config(&config).unwrap();
        let (tx, rx) = watch::channel(Arc::new(config));
        let checker = HealthChecker::new(std::time::Duration::from_secs(1)).unwrap();
        (HealthPoller::new(rx, checker, alerters.health), tx)
    }

    #[tokio::test]
    async fn test_trackers_are_per_network() {
        let mut config = AppConfig::default();
        config.networks = vec![network("mainnet"), network("testnet")];
        let (mut poller, _tx) = poller(config.clone());
        let t0 = Utc::now();

        let alerts = poller.evaluate(&config, &[failure("mainnet", t0), healthy("testnet", t0)]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].network, "mainnet");

        let later = t0 + Duration::minutes(2);
        let alerts = poller.evaluate(&config, &[healthy("mainnet", later), healthy("testnet", later)]);
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            alerts[0].kind,
            HealthAlertKind::Recovery { downtime: Some(d), .. } if d == Duration::minutes(2)
        ));
    }

    #[tokio::test]
    async fn test_removed_network_state_is_dropped() {
        let mut config = AppConfig::default();
        config.networks = vec![network("mainnet"), network("testnet")];
        let (mut poller, _tx) = poller(config.clone());
        let t0 = Utc::now();

        poller.evaluate(&config, &[failure("mainnet", t0), failure("testnet", t0)]);
        assert_eq!(poller.trackers.len(), 2);

        config.networks = vec![network("mainnet")];
        poller.evaluate(&config, &[failure("mainnet", t0)]);
        assert_eq!(poller.trackers.len(), 1);
        assert_eq!(poller.trackers["mainnet"].consecutive_failures(), 2);
    }

    #[tokio::test]
    async fn test_disabled_health_skips_checks() {
        let mut config = AppConfig::default();
        config.health.enabled = false;
        config.networks = vec![network("mainnet")];
        let (mut poller, _tx) = poller(config);

        poller.tick().await;
        assert!(poller.trackers.is_empty());
    }
}
