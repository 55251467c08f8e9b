//! Health alerts for monitored network endpoints.

use crate::alerter::{Alert, Alerter};
use crate::format::{escape_html, footer, format_duration, timestamp_line};
use crate::throttle::AlertKey;
use chainwatch_core::UnhealthyReason;
use chrono::{DateTime, Duration, Utc};

pub type HealthAlerter = Alerter<HealthAlert>;

pub const DOMAIN: &str = "health";

#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlertKind {
    /// A single failed check.
    Failure {
        reason: UnhealthyReason,
        response_time_ms: Option<u64>,
    },
    /// First healthy check after one or more failures.
    Recovery {
        downtime: Option<Duration>,
        response_time_ms: u64,
    },
    /// Endpoint reports more pending work than allowed.
    QueueWarning { queue_size: u64, threshold: u64 },
    /// Failure streak reached the configured threshold.
    ConsecutiveFailures {
        count: u32,
        last_reason: UnhealthyReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthAlert {
    pub network: String,
    pub timestamp: DateTime<Utc>,
    pub kind: HealthAlertKind,
}

impl HealthAlert {
    pub fn new(network: impl Into<String>, timestamp: DateTime<Utc>, kind: HealthAlertKind) -> Self {
        Self {
            network: network.into(),
            timestamp,
            kind,
        }
    }

    fn issue(&self) -> String {
        match &self.kind {
            HealthAlertKind::Failure { reason, .. } => reason.to_string(),
            HealthAlertKind::Recovery { .. } => "recovered".to_string(),
            HealthAlertKind::QueueWarning { .. } => "queue size above threshold".to_string(),
            HealthAlertKind::ConsecutiveFailures { .. } => "consecutive failures".to_string(),
        }
    }
}

impl Alert for HealthAlert {
    fn key(&self) -> AlertKey {
        AlertKey::new(&self.network, self.issue())
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn render(&self) -> String {
        let network = escape_html(&self.network);
        let body = match &self.kind {
            HealthAlertKind::Failure {
                reason,
                response_time_ms,
            } => {
                let mut text = format!(
                    "🔴 <b>Health Check Failed</b>\n\n\
                     <b>Network:</b> {}\n\
                     <b>Reason:</b> {}",
                    network,
                    escape_html(&reason.to_string())
                );
                if let Some(ms) = response_time_ms {
                    text.push_str(&format!("\n<b>Response time:</b> {}ms", ms));
                }
                text
            }
            HealthAlertKind::Recovery {
                downtime,
                response_time_ms,
            } => {
                let mut text = format!(
                    "✅ <b>Health Check Recovered</b>\n\n\
                     <b>Network:</b> {}\n\
                     <b>Response time:</b> {}ms",
                    network, response_time_ms
                );
                if let Some(downtime) = downtime {
                    text.push_str(&format!("\n<b>Downtime:</b> {}", format_duration(*downtime)));
                }
                text
            }
            HealthAlertKind::QueueWarning {
                queue_size,
                threshold,
            } => format!(
                "⚠️ <b>Queue Size Warning</b>\n\n\
                 <b>Network:</b> {}\n\
                 <b>Queue size:</b> {} (threshold {})",
                network, queue_size, threshold
            ),
            HealthAlertKind::ConsecutiveFailures { count, last_reason } => format!(
                "🚨 <b>Consecutive Failures</b>\n\n\
                 <b>Network:</b> {}\n\
                 <b>Failed checks:</b> {} in a row\n\
                 <b>Last reason:</b> {}",
                network,
                count,
                escape_html(&last_reason.to_string())
            ),
        };

        format!(
            "{}\n\n{}\n{}",
            body,
            timestamp_line(self.timestamp),
            footer(DOMAIN, &self.network)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerter::testing::RecordingChannel;
    use crate::throttle::ThrottleConfig;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn failure(network: &str, response_time_ms: u64, minute: i64) -> HealthAlert {
        HealthAlert::new(
            network,
            ts() + Duration::minutes(minute),
            HealthAlertKind::Failure {
                reason: UnhealthyReason::SlowResponse { limit_ms: 5000 },
                response_time_ms: Some(response_time_ms),
            },
        )
    }

    #[test]
    fn test_key_ignores_response_time() {
        assert_eq!(failure("mainnet", 5100, 0).key(), failure("mainnet", 9800, 3).key());
        assert_eq!(
            failure("mainnet", 5100, 0).key(),
            AlertKey::new("mainnet", "response slower than 5000ms")
        );
    }

    #[test]
    fn test_render_failure() {
        let text = failure("mainnet", 5100, 0).render();
        assert_eq!(
            text,
            "🔴 <b>Health Check Failed</b>\n\n\
             <b>Network:</b> mainnet\n\
             <b>Reason:</b> response slower than 5000ms\n\
             <b>Response time:</b> 5100ms\n\n\
             ⏰ 2024-05-01 08:00:00 UTC\n\
             #health #mainnet"
        );
    }

    #[test]
    fn test_render_recovery_with_downtime() {
        let alert = HealthAlert::new(
            "testnet",
            ts(),
            HealthAlertKind::Recovery {
                downtime: Some(Duration::seconds(190)),
                response_time_ms: 87,
            },
        );
        let text = alert.render();
        assert!(text.starts_with("✅ <b>Health Check Recovered</b>"));
        assert!(text.contains("<b>Downtime:</b> 3m 10s"));
        assert!(text.ends_with("#health #testnet"));
    }

    #[test]
    fn test_render_escapes_reason() {
        let alert = HealthAlert::new(
            "mainnet",
            ts(),
            HealthAlertKind::ConsecutiveFailures {
                count: 3,
                last_reason: UnhealthyReason::BadStatus("<degraded>".to_string()),
            },
        );
        assert!(alert.render().contains("reported status '&lt;degraded&gt;'"));
    }

    #[tokio::test]
    async fn test_repeated_failures_collapse() {
        let channel = RecordingChannel::new();
        let alerter = HealthAlerter::new(DOMAIN, channel.clone(), ThrottleConfig::default()).unwrap();

        for minute in 0..6 {
            alerter.send_alert(&failure("mainnet", 5000 + minute as u64, minute)).await;
        }
        // Burst of 3 at t=0,1,2; t=3,4,5 are inside the 5 minute interval.
        assert_eq!(channel.sent_count(), 3);

        // Another network is unaffected.
        assert!(alerter.send_alert(&failure("testnet", 5100, 5)).await);
    }
}
