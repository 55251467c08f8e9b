//! Application configuration.

use chainwatch_alerts::{TelegramSettings, ThrottleConfig, ThrottleConfigError};
use chainwatch_events::EventListenerSettings;
use chainwatch_feeds::{HealthSettings, NetworkTarget, PriceSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid throttle configuration: {0}")]
    Throttle(#[from] ThrottleConfigError),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Logging level, used when neither --log-level nor RUST_LOG is set.
    pub log_level: String,
    /// SQLite URL of the event store.
    pub database_url: String,
    /// Endpoints checked by the health poller.
    pub networks: Vec<NetworkTarget>,
    pub health: HealthSettings,
    pub price: PriceSettings,
    pub events: EventListenerSettings,
    /// Shared by all alerters; read once at startup.
    pub throttle: ThrottleConfig,
    pub telegram: TelegramConfig,
    /// Seconds between config file modification checks.
    pub config_watch_interval_secs: u64,
    /// Seconds between throttle pruning passes.
    pub maintenance_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_url: "sqlite://chainwatch.db".to_string(),
            networks: Vec::new(),
            health: HealthSettings::default(),
            price: PriceSettings::default(),
            events: EventListenerSettings::default(),
            throttle: ThrottleConfig::default(),
            telegram: TelegramConfig::default(),
            config_watch_interval_secs: 10,
            maintenance_interval_secs: 3600,
        }
    }
}

/// Telegram credentials per alert component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub health: TelegramSettings,
    pub price: TelegramSettings,
    pub generic: TelegramSettings,
}

impl AppConfig {
    /// Load the config file and apply environment overrides.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment overrides looked up through `var`.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.is_empty());

        let fallback = TelegramSettings {
            enabled: true,
            bot_token: non_empty("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            chat_id: non_empty("TELEGRAM_CHAT_ID").unwrap_or_default(),
        };
        for settings in [
            &mut self.telegram.health,
            &mut self.telegram.price,
            &mut self.telegram.generic,
        ] {
            *settings = std::mem::take(settings).with_fallback(&fallback);
        }

        if let Some(url) = non_empty("CHAINWATCH_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(url) = non_empty("CHAINWATCH_RPC_URL") {
            self.events.rpc_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (name, value) in [
            ("health.interval_secs", self.health.interval_secs),
            ("health.timeout_secs", self.health.timeout_secs),
            ("price.interval_secs", self.price.interval_secs),
            ("price.timeout_secs", self.price.timeout_secs),
            ("config_watch_interval_secs", self.config_watch_interval_secs),
            ("maintenance_interval_secs", self.maintenance_interval_secs),
        ] {
            if value == 0 {
                return invalid(format!("{} must be greater than 0", name));
            }
        }

        self.throttle.validate()?;

        let mut names = HashSet::new();
        for network in &self.networks {
            if network.name.trim().is_empty() {
                return invalid("network name must not be empty".to_string());
            }
            if network.health_url.trim().is_empty() {
                return invalid(format!("network {} has no health_url", network.name));
            }
            if !names.insert(network.name.as_str()) {
                return invalid(format!("duplicate network name: {}", network.name));
            }
        }

        if self.price.change_threshold_pct < 0.0 {
            return invalid("price.change_threshold_pct must not be negative".to_string());
        }
        if let (Some(lower), Some(upper)) = (self.price.lower_threshold, self.price.upper_threshold) {
            if lower > upper {
                return invalid(format!(
                    "price.lower_threshold ({}) is above price.upper_threshold ({})",
                    lower, upper
                ));
            }
        }

        if self.events.enabled {
            self.events.validate().map_err(ConfigError::Invalid)?;
        }

        Ok(())
    }

    pub fn config_watch_interval(&self) -> Duration {
        Duration::from_secs(self.config_watch_interval_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}
