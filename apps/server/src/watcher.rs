//! Config file hot reload.

use crate::config::AppConfig;
use crate::tasks::Poller;
use async_trait::async_trait;
use chainwatch_alerts::{PriceAlert, PriceAlertKind, PriceAlerter};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reloads the config file when its modification time changes and
/// publishes valid snapshots to the pollers.
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    publisher: watch::Sender<Arc<AppConfig>>,
    alerter: Arc<PriceAlerter>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ConfigWatcher {
    pub fn new(
        path: PathBuf,
        publisher: watch::Sender<Arc<AppConfig>>,
        alerter: Arc<PriceAlerter>,
    ) -> Self {
        let last_modified = modified(&path);
        Self {
            path,
            last_modified,
            publisher,
            alerter,
        }
    }

    /// Reload if the file changed. Returns the newly published config.
    pub fn reload(&mut self) -> Option<Arc<AppConfig>> {
        let current = modified(&self.path);
        if current.is_none() || current == self.last_modified {
            return None;
        }
        self.last_modified = current;

        let config = match AppConfig::load(&self.path).and_then(|c| c.validate().map(|_| c)) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring invalid config reload");
                return None;
            }
        };

        let previous = self.publisher.borrow().clone();
        if *previous == config {
            debug!(path = %self.path.display(), "Config file touched without changes");
            return None;
        }

        if previous.throttle != config.throttle
            || previous.events != config.events
            || previous.database_url != config.database_url
            || previous.health.interval_secs != config.health.interval_secs
            || previous.health.timeout_secs != config.health.timeout_secs
            || previous.price.interval_secs != config.price.interval_secs
            || previous.price.timeout_secs != config.price.timeout_secs
            || previous.telegram != config.telegram
        {
            warn!("Some changed settings only take effect after a restart");
        }

        let config = Arc::new(config);
        self.publisher.send_replace(config.clone());
        info!(path = %self.path.display(), "Config reloaded");
        Some(config)
    }
}

#[async_trait]
impl Poller for ConfigWatcher {
    fn name(&self) -> &'static str {
        "config-watcher"
    }

    async fn tick(&mut self) {
        let previous = self.publisher.borrow().clone();
        let Some(config) = self.reload() else {
            return;
        };

        let changes = previous.price.describe_changes(&config.price);
        if changes.is_empty() {
            return;
        }

        let alert = PriceAlert::new(
            &config.price.token_id,
            &config.price.vs_currency,
            Utc::now(),
            PriceAlertKind::ConfigUpdate { changes },
        );
        self.alerter.send_alert(&alert).await;
    }
}
