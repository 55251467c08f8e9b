//! Error types for feed operations.

use thiserror::Error;

/// Errors that can occur while fetching feed data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Price for {token}/{vs_currency} not found in response")]
    MissingPrice { token: String, vs_currency: String },
}

impl FeedError {
    /// Returns true if this error is transient and the next poll may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FeedError::HttpStatus(code) => *code == 429 || *code >= 500,
            FeedError::MissingPrice { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        assert!(FeedError::HttpStatus(503).is_transient());
        assert!(FeedError::HttpStatus(429).is_transient());
        assert!(!FeedError::HttpStatus(404).is_transient());
        assert!(!FeedError::MissingPrice {
            token: "ethereum".to_string(),
            vs_currency: "usd".to_string(),
        }
        .is_transient());
    }
}
