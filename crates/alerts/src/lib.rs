//! Throttled Telegram alerting for the chainwatch monitor.
//!
//! This crate provides:
//! - A per-key burst/interval alert throttle
//! - A Telegram notification channel
//! - Health, price and generic alert payloads and their alerters

pub mod alerter;
pub mod channel;
pub mod format;
pub mod generic;
pub mod health;
pub mod price;
pub mod throttle;

pub use alerter::{Alert, Alerter};
pub use channel::{ChannelError, NotificationChannel, TelegramChannel, TelegramSettings};
pub use generic::{GenericAlert, GenericAlertKind, GenericAlerter};
pub use health::{HealthAlert, HealthAlertKind, HealthAlerter};
pub use price::{PriceAlert, PriceAlertKind, PriceAlerter, ServiceStatus};
pub use throttle::{AlertKey, AlertThrottle, ThrottleConfig, ThrottleConfigError, ThrottleState};
