//! Token price polling.
//!
//! Prices come from a CoinGecko-style "simple price" endpoint:
//! `GET <api_url>?ids=<token>&vs_currencies=<currency>` answering
//! `{"<token>": {"<currency>": 1234.5}}`.

use crate::error::FeedError;
use chainwatch_alerts::{PriceAlert, PriceAlertKind};
use chainwatch_core::{percent_change, PriceQuote, ThresholdDirection};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Price poller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceSettings {
    pub enabled: bool,
    pub api_url: String,
    pub token_id: String,
    pub vs_currency: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Alert when the price moves this many percent from the last alerted price.
    pub change_threshold_pct: f64,
    pub upper_threshold: Option<f64>,
    pub lower_threshold: Option<f64>,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            token_id: "ethereum".to_string(),
            vs_currency: "usd".to_string(),
            interval_secs: 300,
            timeout_secs: 10,
            change_threshold_pct: 5.0,
            upper_threshold: None,
            lower_threshold: None,
        }
    }
}

fn describe_threshold(value: Option<f64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

impl PriceSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Human readable list of settings that differ in `new`.
    pub fn describe_changes(&self, new: &PriceSettings) -> Vec<String> {
        let mut changes = Vec::new();

        if self.enabled != new.enabled {
            changes.push(format!("enabled: {} → {}", self.enabled, new.enabled));
        }
        if self.api_url != new.api_url {
            changes.push(format!("api url: {} → {}", self.api_url, new.api_url));
        }
        if self.token_id != new.token_id {
            changes.push(format!("token: {} → {}", self.token_id, new.token_id));
        }
        if self.vs_currency != new.vs_currency {
            changes.push(format!("currency: {} → {}", self.vs_currency, new.vs_currency));
        }
        if self.interval_secs != new.interval_secs {
            changes.push(format!(
                "interval: {}s → {}s (applies after restart)",
                self.interval_secs, new.interval_secs
            ));
        }
        if self.change_threshold_pct != new.change_threshold_pct {
            changes.push(format!(
                "change threshold: {}% → {}%",
                self.change_threshold_pct, new.change_threshold_pct
            ));
        }
        if self.upper_threshold != new.upper_threshold {
            changes.push(format!(
                "upper threshold: {} → {}",
                describe_threshold(self.upper_threshold),
                describe_threshold(new.upper_threshold)
            ));
        }
        if self.lower_threshold != new.lower_threshold {
            changes.push(format!(
                "lower threshold: {} → {}",
                describe_threshold(self.lower_threshold),
                describe_threshold(new.lower_threshold)
            ));
        }

        changes
    }
}

/// Fetches token prices over HTTP.
pub struct PriceFetcher {
    client: reqwest::Client,
}

impl PriceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, settings: &PriceSettings) -> Result<PriceQuote, FeedError> {
        let response = self
            .client
            .get(&settings.api_url)
            .query(&[
                ("ids", settings.token_id.as_str()),
                ("vs_currencies", settings.vs_currency.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::HttpStatus(response.status().as_u16()));
        }

        let json: serde_json::Value = response.json().await?;
        let price = parse_price(&json, &settings.token_id, &settings.vs_currency)?;

        Ok(PriceQuote::new(
            &settings.token_id,
            &settings.vs_currency,
            price,
            Utc::now(),
        ))
    }
}

/// Extract `json[token][vs_currency]` as a positive finite number.
pub fn parse_price(json: &serde_json::Value, token: &str, vs_currency: &str) -> Result<f64, FeedError> {
    json.get(token)
        .and_then(|t| t.get(vs_currency))
        .and_then(|p| p.as_f64())
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| FeedError::MissingPrice {
            token: token.to_string(),
            vs_currency: vs_currency.to_string(),
        })
}

/// Tracks consecutive price observations of one token in one currency.
#[derive(Debug, Default, Clone)]
pub struct PriceTracker {
    /// Token and quote currency the baseline is expressed in.
    pair: Option<(String, String)>,
    /// Price at the last change alert (or the first observation).
    baseline: Option<f64>,
    /// Most recent observed price.
    last: Option<f64>,
}

impl PriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last
    }

    /// Fold a quote into the tracker and return the alerts it causes.
    /// A quote for a different token or currency than before starts over.
    pub fn observe(&mut self, quote: &PriceQuote, settings: &PriceSettings) -> Vec<PriceAlert> {
        let alert =
            |kind| PriceAlert::new(&quote.token, &quote.vs_currency, quote.observed_at, kind);
        let price = quote.price;

        let same_pair = self
            .pair
            .as_ref()
            .is_some_and(|(token, currency)| *token == quote.token && *currency == quote.vs_currency);
        if !same_pair {
            *self = Self {
                pair: Some((quote.token.clone(), quote.vs_currency.clone())),
                ..Self::default()
            };
        }

        let (Some(baseline), Some(last)) = (self.baseline, self.last) else {
            self.baseline = Some(price);
            self.last = Some(price);
            return vec![alert(PriceAlertKind::Startup { price })];
        };

        let mut alerts = Vec::new();

        let change_pct = percent_change(baseline, price);
        if settings.change_threshold_pct > 0.0 && change_pct.abs() >= settings.change_threshold_pct {
            alerts.push(alert(PriceAlertKind::PriceChange {
                previous: baseline,
                current: price,
                change_pct,
            }));
            self.baseline = Some(price);
        }

        if let Some(upper) = settings.upper_threshold {
            if last < upper && price >= upper {
                alerts.push(alert(PriceAlertKind::PriceThreshold {
                    price,
                    threshold: upper,
                    direction: ThresholdDirection::Above,
                }));
            }
        }

        if let Some(lower) = settings.lower_threshold {
            if last > lower && price <= lower {
                alerts.push(alert(PriceAlertKind::PriceThreshold {
                    price,
                    threshold: lower,
                    direction: ThresholdDirection::Below,
                }));
            }
        }

        self.last = Some(price);
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn quote(price: f64) -> PriceQuote {
        PriceQuote::new("ethereum", "usd", price, Utc::now())
    }

    fn settings() -> PriceSettings {
        PriceSettings {
            change_threshold_pct: 5.0,
            upper_threshold: Some(2500.0),
            lower_threshold: Some(1500.0),
            ..Default::default()
        }
    }

    fn kinds(alerts: Vec<PriceAlert>) -> Vec<PriceAlertKind> {
        alerts.into_iter().map(|a| a.kind).collect()
    }

    #[test]
    fn test_parse_price() {
        let body = json!({"ethereum": {"usd": 2345.67}});
        assert_eq!(parse_price(&body, "ethereum", "usd").unwrap(), 2345.67);
        assert!(matches!(
            parse_price(&body, "ethereum", "eur"),
            Err(FeedError::MissingPrice { .. })
        ));
        assert!(parse_price(&json!({"ethereum": {"usd": 0}}), "ethereum", "usd").is_err());
    }

    #[test]
    fn test_first_observation_is_startup() {
        let mut tracker = PriceTracker::new();
        assert_eq!(
            kinds(tracker.observe(&quote(2000.0), &settings())),
            vec![PriceAlertKind::Startup { price: 2000.0 }]
        );
        assert_eq!(tracker.last_price(), Some(2000.0));
    }

    #[test]
    fn test_change_is_measured_from_last_alert() {
        let mut tracker = PriceTracker::new();
        let settings = settings();
        tracker.observe(&quote(2000.0), &settings);

        // 3% and then 4.5% from the baseline: below threshold
        assert!(tracker.observe(&quote(2060.0), &settings).is_empty());
        assert!(tracker.observe(&quote(2090.0), &settings).is_empty());

        // 5.5% from the baseline of 2000
        let alerts = kinds(tracker.observe(&quote(2110.0), &settings));
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            alerts[0],
            PriceAlertKind::PriceChange { previous, current, .. }
                if previous == 2000.0 && current == 2110.0
        ));

        // Baseline moved to 2110
        assert!(tracker.observe(&quote(2150.0), &settings).is_empty());
    }

    #[test]
    fn test_threshold_crossings() {
        let mut tracker = PriceTracker::new();
        let settings = PriceSettings {
            change_threshold_pct: 0.0,
            ..settings()
        };
        tracker.observe(&quote(2400.0), &settings);

        assert_eq!(
            kinds(tracker.observe(&quote(2500.0), &settings)),
            vec![PriceAlertKind::PriceThreshold {
                price: 2500.0,
                threshold: 2500.0,
                direction: ThresholdDirection::Above,
            }]
        );
        // Staying above does not alert again
        assert!(tracker.observe(&quote(2600.0), &settings).is_empty());

        assert!(tracker.observe(&quote(1600.0), &settings).is_empty());
        assert_eq!(
            kinds(tracker.observe(&quote(1499.0), &settings)),
            vec![PriceAlertKind::PriceThreshold {
                price: 1499.0,
                threshold: 1500.0,
                direction: ThresholdDirection::Below,
            }]
        );
    }

    #[test]
    fn test_token_switch_restarts() {
        let mut tracker = PriceTracker::new();
        tracker.observe(&quote(2000.0), &settings());

        let bitcoin = PriceQuote::new("bitcoin", "usd", 60000.0, Utc::now());
        assert_eq!(
            kinds(tracker.observe(&bitcoin, &settings())),
            vec![PriceAlertKind::Startup { price: 60000.0 }]
        );
    }

    #[test]
    fn test_currency_switch_restarts() {
        let mut tracker = PriceTracker::new();
        tracker.observe(&quote(2000.0), &settings());

        let in_yen = PriceQuote::new("ethereum", "jpy", 300000.0, Utc::now());
        assert_eq!(
            kinds(tracker.observe(&in_yen, &settings())),
            vec![PriceAlertKind::Startup { price: 300000.0 }]
        );
        assert_eq!(tracker.last_price(), Some(300000.0));

        let next = PriceQuote::new("ethereum", "jpy", 300100.0, Utc::now());
        assert!(tracker.observe(&next, &settings()).is_empty());
    }

    #[test]
    fn test_describe_changes() {
        let old = settings();
        let new = PriceSettings {
            upper_threshold: Some(3000.0),
            lower_threshold: None,
            ..settings()
        };
        assert_eq!(
            old.describe_changes(&new),
            vec![
                "upper threshold: 2500 → 3000".to_string(),
                "lower threshold: 1500 → none".to_string(),
            ]
        );
        assert!(old.describe_changes(&old).is_empty());
    }
}
