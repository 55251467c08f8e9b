//! Token price observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single observed token price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Token identifier as used by the price API (e.g. "ethereum").
    pub token: String,
    /// Quote currency (e.g. "usd").
    pub vs_currency: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(
        token: impl Into<String>,
        vs_currency: impl Into<String>,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            vs_currency: vs_currency.into(),
            price,
            observed_at,
        }
    }
}

/// Which side of a threshold the price moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdDirection {
    /// Price rose to or above an upper threshold.
    Above,
    /// Price fell to or below a lower threshold.
    Below,
}

impl fmt::Display for ThresholdDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdDirection::Above => write!(f, "above"),
            ThresholdDirection::Below => write!(f, "below"),
        }
    }
}

/// Percentage change from `previous` to `current`: (current - previous) / previous * 100
pub fn percent_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}
