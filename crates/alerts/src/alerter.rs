//! Throttled alert delivery shared by the health, price and generic alerters.

use crate::channel::NotificationChannel;
use crate::format::canary_message;
use crate::throttle::{AlertKey, AlertThrottle, ThrottleConfig, ThrottleConfigError};
use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A typed alert payload that knows its identity and how to render itself.
pub trait Alert: Send + Sync {
    /// Throttling identity. Must not include fluctuating values.
    fn key(&self) -> AlertKey;

    /// When the condition was observed; used as "now" for throttling.
    fn timestamp(&self) -> DateTime<Utc>;

    /// One-off, administratively triggered alerts bypass throttling.
    fn is_throttle_exempt(&self) -> bool {
        false
    }

    /// Telegram HTML text.
    fn render(&self) -> String;
}

/// Sends one domain's alerts through a channel, throttled per [`AlertKey`].
pub struct Alerter<A> {
    domain: &'static str,
    channel: Arc<dyn NotificationChannel>,
    throttle: AlertThrottle,
    _alert: PhantomData<fn(&A)>,
}

impl<A: Alert> Alerter<A> {
    pub fn new(
        domain: &'static str,
        channel: Arc<dyn NotificationChannel>,
        config: ThrottleConfig,
    ) -> Result<Self, ThrottleConfigError> {
        Ok(Self::with_throttle(domain, channel, AlertThrottle::new(config)?))
    }

    pub fn with_throttle(
        domain: &'static str,
        channel: Arc<dyn NotificationChannel>,
        throttle: AlertThrottle,
    ) -> Self {
        Self {
            domain,
            channel,
            throttle,
            _alert: PhantomData,
        }
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_enabled()
    }

    pub fn throttle(&self) -> &AlertThrottle {
        &self.throttle
    }

    /// Send an alert unless it is throttled.
    ///
    /// Returns true only when the message was delivered. Throttled alerts
    /// are never rendered; failed deliveries do not count against the
    /// throttle budget.
    pub async fn send_alert(&self, alert: &A) -> bool {
        if !self.channel.is_enabled() {
            return false;
        }

        if alert.is_throttle_exempt() {
            return self.deliver(&alert.render()).await;
        }

        let key = alert.key();
        let now = alert.timestamp();
        let _guard = self.throttle.lock(&key).await;

        if !self.throttle.should_emit(&key, now) {
            debug!(domain = self.domain, key = %key, "Alert throttled");
            return false;
        }

        let sent = self.deliver(&alert.render()).await;
        if sent {
            self.throttle.record_emission(&key, now);
        }
        sent
    }

    /// Send a fixed canary message, bypassing the throttle.
    pub async fn test_connection(&self, host: &str) -> bool {
        if !self.channel.is_enabled() {
            info!(domain = self.domain, "Alert channel disabled, skipping test");
            return false;
        }
        self.deliver(&canary_message(self.domain, host, Utc::now()))
            .await
    }

    async fn deliver(&self, text: &str) -> bool {
        let sent = self.channel.send(text).await;
        if !sent {
            error!(domain = self.domain, "Failed to send alert");
        }
        sent
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Channel that records messages and can be told to fail.
    pub struct RecordingChannel {
        enabled: bool,
        fail: AtomicBool,
        pub sent: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                enabled: true,
                fail: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn disabled() -> Arc<Self> {
            Arc::new(Self {
                enabled: false,
                fail: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn last(&self) -> Option<String> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, text: &str) -> bool {
            if self.fail.load(Ordering::SeqCst) {
                return false;
            }
            self.sent.lock().unwrap().push(text.to_string());
            true
        }
    }
}
