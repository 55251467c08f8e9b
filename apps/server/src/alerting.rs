//! Alerter construction from configuration.

use crate::config::AppConfig;
use crate::error::AppError;
use chainwatch_alerts::{
    generic, health, price, ChannelError, GenericAlerter, HealthAlerter, NotificationChannel,
    PriceAlerter, TelegramChannel, TelegramSettings,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// The three alert components, each with its own channel and throttle.
#[derive(Clone)]
pub struct Alerters {
    pub health: Arc<HealthAlerter>,
    pub price: Arc<PriceAlerter>,
    pub generic: Arc<GenericAlerter>,
}

/// First characters of a chat id, enough to tell chats apart in logs.
fn chat_id_prefix(chat_id: &str) -> String {
    chat_id.trim().chars().take(6).collect()
}

fn channel(domain: &str, settings: &TelegramSettings) -> Result<Arc<dyn NotificationChannel>, ChannelError> {
    let channel = TelegramChannel::new(settings)?;
    if channel.is_enabled() {
        info!(
            domain,
            chat_id = %chat_id_prefix(&settings.chat_id),
            "Telegram alerts enabled"
        );
    } else {
        info!(domain, "Telegram alerts disabled (no bot token or chat id)");
    }
    Ok(Arc::new(channel))
}

impl Alerters {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let telegram = &config.telegram;
        Ok(Self {
            health: Arc::new(HealthAlerter::new(
                health::DOMAIN,
                channel(health::DOMAIN, &telegram.health)?,
                config.throttle,
            )?),
            price: Arc::new(PriceAlerter::new(
                price::DOMAIN,
                channel(price::DOMAIN, &telegram.price)?,
                config.throttle,
            )?),
            generic: Arc::new(GenericAlerter::new(
                generic::DOMAIN,
                channel(generic::DOMAIN, &telegram.generic)?,
                config.throttle,
            )?),
        })
    }

    /// Send the canary message through every enabled component.
    /// Returns (domain, delivered) per enabled component.
    pub async fn test_connections(&self, host: &str) -> Vec<(&'static str, bool)> {
        let mut results = Vec::new();
        if self.health.is_enabled() {
            results.push((self.health.domain(), self.health.test_connection(host).await));
        }
        if self.price.is_enabled() {
            results.push((self.price.domain(), self.price.test_connection(host).await));
        }
        if self.generic.is_enabled() {
            results.push((self.generic.domain(), self.generic.test_connection(host).await));
        }
        results
    }

    /// Drop expired throttle entries from every component.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        self.health.throttle().prune(now)
            + self.price.throttle().prune(now)
            + self.generic.throttle().prune(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch_alerts::{HealthAlert, HealthAlertKind};
    use chainwatch_core::UnhealthyReason;

    #[test]
    fn test_unconfigured_alerters_are_disabled() {
        let alerters = Alerters::from_config(&AppConfig::default()).unwrap();
        assert!(!alerters.health.is_enabled());
        assert!(!alerters.price.is_enabled());
        assert!(!alerters.generic.is_enabled());
    }

    #[test]
    fn test_bad_chat_id_is_rejected() {
        let mut config = AppConfig::default();
        config.telegram.health = TelegramSettings {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: "not-a-number".to_string(),
        };
        assert!(Alerters::from_config(&config).is_err());
    }

    #[test]
    fn test_out_of_range_throttle_is_an_error() {
        let mut config = AppConfig::default();
        config.throttle.min_interval_secs = 100_000_000_000_000_000;
        assert!(matches!(
            Alerters::from_config(&config),
            Err(AppError::Throttle(_))
        ));
    }

    #[test]
    fn test_chat_id_prefix() {
        assert_eq!(chat_id_prefix("-1001234567890"), "-10012");
        assert_eq!(chat_id_prefix("\u{3000}-100123"), "-10012");
        assert_eq!(chat_id_prefix("12"), "12");
    }

    #[tokio::test]
    async fn test_disabled_components_skip_test_and_state() {
        let alerters = Alerters::from_config(&AppConfig::default()).unwrap();
        assert!(alerters.test_connections("host").await.is_empty());

        let alert = HealthAlert::new(
            "mainnet",
            Utc::now(),
            HealthAlertKind::Failure {
                reason: UnhealthyReason::Timeout,
                response_time_ms: None,
            },
        );
        assert!(!alerters.health.send_alert(&alert).await);
        assert_eq!(alerters.prune(Utc::now()), 0);
        assert!(alerters.health.throttle().is_empty());
    }
}
