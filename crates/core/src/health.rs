//! Health check results produced by the endpoint poller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an endpoint was considered unhealthy.
///
/// The `Display` text is stable for a given condition: it never contains
/// response times or other values that change from one check to the next,
/// so it can be used to identify a recurring problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnhealthyReason {
    /// Request did not complete within the configured timeout.
    Timeout,
    /// Transport level failure (DNS, TLS, refused connection...).
    Connection(String),
    /// Endpoint answered with a non-2xx status.
    HttpStatus(u16),
    /// Body could not be parsed as JSON.
    InvalidJson,
    /// JSON `status` field carried an unexpected value.
    BadStatus(String),
    /// JSON `healthy` field was false.
    ReportedUnhealthy,
    /// Endpoint answered, but slower than allowed.
    SlowResponse { limit_ms: u64 },
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnhealthyReason::Timeout => write!(f, "request timed out"),
            UnhealthyReason::Connection(err) => write!(f, "connection failed: {}", err),
            UnhealthyReason::HttpStatus(code) => write!(f, "unexpected HTTP status {}", code),
            UnhealthyReason::InvalidJson => write!(f, "response is not valid JSON"),
            UnhealthyReason::BadStatus(status) => write!(f, "reported status '{}'", status),
            UnhealthyReason::ReportedUnhealthy => write!(f, "endpoint reported unhealthy"),
            UnhealthyReason::SlowResponse { limit_ms } => {
                write!(f, "response slower than {}ms", limit_ms)
            }
        }
    }
}

/// Outcome of a single health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthOutcome {
    Healthy {
        response_time_ms: u64,
        /// Pending work reported by the endpoint, if it exposes one.
        queue_size: Option<u64>,
    },
    Unhealthy {
        reason: UnhealthyReason,
        /// Absent when no response was received at all.
        response_time_ms: Option<u64>,
    },
}

/// A health check result for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Network (or service) name the endpoint belongs to.
    pub network: String,
    /// When the check was started.
    pub checked_at: DateTime<Utc>,
    pub outcome: HealthOutcome,
}

impl HealthCheckResult {
    pub fn new(network: impl Into<String>, checked_at: DateTime<Utc>, outcome: HealthOutcome) -> Self {
        Self {
            network: network.into(),
            checked_at,
            outcome,
        }
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        matches!(self.outcome, HealthOutcome::Healthy { .. })
    }

    /// Response time in milliseconds, if a response was received.
    pub fn response_time_ms(&self) -> Option<u64> {
        match &self.outcome {
            HealthOutcome::Healthy { response_time_ms, .. } => Some(*response_time_ms),
            HealthOutcome::Unhealthy { response_time_ms, .. } => *response_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reason_text_is_stable() {
        let slow = UnhealthyReason::SlowResponse { limit_ms: 5000 };
        assert_eq!(slow.to_string(), "response slower than 5000ms");
        assert_eq!(UnhealthyReason::HttpStatus(503).to_string(), "unexpected HTTP status 503");
    }

    #[test]
    fn test_result_accessors() {
        let healthy = HealthCheckResult::new(
            "mainnet",
            Utc::now(),
            HealthOutcome::Healthy {
                response_time_ms: 120,
                queue_size: None,
            },
        );
        assert!(healthy.is_healthy());
        assert_eq!(healthy.response_time_ms(), Some(120));

        let down = HealthCheckResult::new(
            "mainnet",
            Utc::now(),
            HealthOutcome::Unhealthy {
                reason: UnhealthyReason::Timeout,
                response_time_ms: None,
            },
        );
        assert!(!down.is_healthy());
        assert_eq!(down.response_time_ms(), None);
    }
}
