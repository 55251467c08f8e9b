//! HTTP pollers for endpoint health and token prices.

pub mod error;
pub mod health;
pub mod price;

pub use error::FeedError;
pub use health::{HealthChecker, HealthSettings, HealthTracker, NetworkTarget};
pub use price::{PriceFetcher, PriceSettings, PriceTracker};
