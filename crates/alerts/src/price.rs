//! Token price alerts.

use crate::alerter::{Alert, Alerter};
use crate::format::{escape_html, footer, format_price, timestamp_line};
use crate::throttle::AlertKey;
use chainwatch_core::ThresholdDirection;
use chrono::{DateTime, Utc};
use std::fmt;

pub type PriceAlerter = Alerter<PriceAlert>;

pub const DOMAIN: &str = "price";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Started,
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Started => write!(f, "started"),
            ServiceStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PriceAlertKind {
    /// First price seen after the monitor started.
    Startup { price: f64 },
    /// Price moved by at least the configured percentage.
    PriceChange {
        previous: f64,
        current: f64,
        change_pct: f64,
    },
    /// Price crossed a configured threshold.
    PriceThreshold {
        price: f64,
        threshold: f64,
        direction: ThresholdDirection,
    },
    /// Price monitoring settings were reloaded.
    ConfigUpdate { changes: Vec<String> },
    /// Monitor process started or stopped.
    ServiceStatus {
        status: ServiceStatus,
        host: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceAlert {
    /// Token identifier, used as the alert scope.
    pub token: String,
    pub vs_currency: String,
    pub timestamp: DateTime<Utc>,
    pub kind: PriceAlertKind,
}

impl PriceAlert {
    pub fn new(
        token: impl Into<String>,
        vs_currency: impl Into<String>,
        timestamp: DateTime<Utc>,
        kind: PriceAlertKind,
    ) -> Self {
        Self {
            token: token.into(),
            vs_currency: vs_currency.into(),
            timestamp,
            kind,
        }
    }

    fn issue(&self) -> String {
        match &self.kind {
            PriceAlertKind::Startup { .. } => "startup".to_string(),
            PriceAlertKind::PriceChange { change_pct, .. } => {
                if *change_pct >= 0.0 {
                    "price rose".to_string()
                } else {
                    "price fell".to_string()
                }
            }
            PriceAlertKind::PriceThreshold {
                threshold,
                direction,
                ..
            } => format!("price {} {}", direction, threshold),
            PriceAlertKind::ConfigUpdate { .. } => "config update".to_string(),
            PriceAlertKind::ServiceStatus { status, .. } => format!("service {}", status),
        }
    }
}

impl Alert for PriceAlert {
    fn key(&self) -> AlertKey {
        AlertKey::new(&self.token, self.issue())
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn is_throttle_exempt(&self) -> bool {
        matches!(
            self.kind,
            PriceAlertKind::Startup { .. }
                | PriceAlertKind::ConfigUpdate { .. }
                | PriceAlertKind::ServiceStatus { .. }
        )
    }

    fn render(&self) -> String {
        let token = escape_html(&self.token.to_uppercase());
        let cur = self.vs_currency.as_str();

        let body = match &self.kind {
            PriceAlertKind::Startup { price } => format!(
                "🚀 <b>Price Monitor Started</b>\n\n\
                 <b>Token:</b> {}\n\
                 <b>Current price:</b> {}",
                token,
                format_price(*price, cur)
            ),
            PriceAlertKind::PriceChange {
                previous,
                current,
                change_pct,
            } => {
                let (emoji, verb) = if *change_pct >= 0.0 {
                    ("📈", "Up")
                } else {
                    ("📉", "Down")
                };
                format!(
                    "{} <b>Price {} {:.2}%</b>\n\n\
                     <b>Token:</b> {}\n\
                     <b>Previous:</b> {}\n\
                     <b>Current:</b> {}",
                    emoji,
                    verb,
                    change_pct.abs(),
                    token,
                    format_price(*previous, cur),
                    format_price(*current, cur)
                )
            }
            PriceAlertKind::PriceThreshold {
                price,
                threshold,
                direction,
            } => {
                let emoji = match direction {
                    ThresholdDirection::Above => "🟢",
                    ThresholdDirection::Below => "🔻",
                };
                format!(
                    "{} <b>Price Threshold Crossed</b>\n\n\
                     <b>Token:</b> {}\n\
                     <b>Price:</b> {} ({} {})",
                    emoji,
                    token,
                    format_price(*price, cur),
                    direction,
                    format_price(*threshold, cur)
                )
            }
            PriceAlertKind::ConfigUpdate { changes } => {
                let mut text = format!(
                    "⚙️ <b>Price Monitor Config Updated</b>\n\n<b>Token:</b> {}",
                    token
                );
                if changes.is_empty() {
                    text.push_str("\nNo price settings changed");
                }
                for change in changes {
                    text.push_str(&format!("\n• {}", escape_html(change)));
                }
                text
            }
            PriceAlertKind::ServiceStatus { status, host } => {
                let emoji = match status {
                    ServiceStatus::Started => "🟢",
                    ServiceStatus::Stopped => "🛑",
                };
                format!(
                    "{} <b>Monitor {}</b>\n\n<b>Host:</b> {}",
                    emoji,
                    status,
                    escape_html(host)
                )
            }
        };

        format!(
            "{}\n\n{}\n{}",
            body,
            timestamp_line(self.timestamp),
            footer(DOMAIN, &self.token)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerter::testing::RecordingChannel;
    use crate::throttle::ThrottleConfig;
    use chrono::{Duration, TimeZone};

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn change(previous: f64, current: f64, minute: i64) -> PriceAlert {
        PriceAlert::new(
            "ethereum",
            "usd",
            ts(minute),
            PriceAlertKind::PriceChange {
                previous,
                current,
                change_pct: chainwatch_core::percent_change(previous, current),
            },
        )
    }

    #[test]
    fn test_exempt_kinds() {
        let startup = PriceAlert::new("ethereum", "usd", ts(0), PriceAlertKind::Startup { price: 1.0 });
        let config = PriceAlert::new(
            "ethereum",
            "usd",
            ts(0),
            PriceAlertKind::ConfigUpdate { changes: vec![] },
        );
        let status = PriceAlert::new(
            "ethereum",
            "usd",
            ts(0),
            PriceAlertKind::ServiceStatus {
                status: ServiceStatus::Started,
                host: "node-1".to_string(),
            },
        );
        assert!(startup.is_throttle_exempt());
        assert!(config.is_throttle_exempt());
        assert!(status.is_throttle_exempt());
        assert!(!change(100.0, 110.0, 0).is_throttle_exempt());
    }

    #[test]
    fn test_change_key_depends_on_direction_only() {
        assert_eq!(change(100.0, 110.0, 0).key(), change(110.0, 125.0, 1).key());
        assert_ne!(change(100.0, 110.0, 0).key(), change(110.0, 90.0, 1).key());
    }

    #[test]
    fn test_render_price_change() {
        let text = change(2000.0, 2200.0, 0).render();
        assert!(text.starts_with("📈 <b>Price Up 10.00%</b>"));
        assert!(text.contains("<b>Token:</b> ETHEREUM"));
        assert!(text.contains("<b>Previous:</b> $2000.00"));
        assert!(text.contains("<b>Current:</b> $2200.00"));
        assert!(text.ends_with("#price #ethereum"));
    }

    #[test]
    fn test_render_threshold() {
        let alert = PriceAlert::new(
            "ethereum",
            "usd",
            ts(0),
            PriceAlertKind::PriceThreshold {
                price: 1450.0,
                threshold: 1500.0,
                direction: ThresholdDirection::Below,
            },
        );
        assert!(alert.render().contains("<b>Price:</b> $1450.00 (below $1500.00)"));
        assert_eq!(alert.key(), AlertKey::new("ethereum", "price below 1500"));
    }

    #[tokio::test]
    async fn test_startup_always_sent() {
        let channel = RecordingChannel::new();
        let alerter = PriceAlerter::new(DOMAIN, channel.clone(), ThrottleConfig::default()).unwrap();
        let startup = PriceAlert::new("ethereum", "usd", ts(0), PriceAlertKind::Startup { price: 1.0 });

        for _ in 0..5 {
            assert!(alerter.send_alert(&startup).await);
        }
        assert_eq!(channel.sent_count(), 5);
        assert!(alerter.throttle().is_empty());
    }
}
