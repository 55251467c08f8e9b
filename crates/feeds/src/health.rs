//! Endpoint health polling.
//!
//! [`HealthChecker`] performs the HTTP request and validates the JSON body;
//! [`HealthTracker`] keeps the per-network failure streak and turns check
//! results into health alerts.

use crate::error::FeedError;
use chainwatch_alerts::{HealthAlert, HealthAlertKind};
use chainwatch_core::{HealthCheckResult, HealthOutcome, UnhealthyReason};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Status values accepted as healthy in a `status` JSON field.
const HEALTHY_STATUSES: [&str; 3] = ["ok", "healthy", "up"];

/// A monitored network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTarget {
    pub name: String,
    pub health_url: String,
    /// Responses slower than this are treated as failures.
    #[serde(default)]
    pub max_response_ms: Option<u64>,
    /// Warn when the endpoint reports a queue larger than this.
    #[serde(default)]
    pub queue_warning_threshold: Option<u64>,
}

/// Health poller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Failure streak length that triggers a consecutive-failures alert.
    pub consecutive_failure_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            timeout_secs: 10,
            consecutive_failure_threshold: 3,
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Performs health checks over HTTP.
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Check a single endpoint. Never fails: problems become an
    /// unhealthy outcome.
    pub async fn check(&self, target: &NetworkTarget) -> HealthCheckResult {
        let checked_at = Utc::now();
        let started = Instant::now();

        let outcome = match self.client.get(&target.health_url).send().await {
            Err(e) => HealthOutcome::Unhealthy {
                reason: transport_reason(e),
                response_time_ms: None,
            },
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match body {
                    Ok(body) => evaluate_response(status, &body, elapsed_ms, target),
                    Err(e) => HealthOutcome::Unhealthy {
                        reason: transport_reason(e),
                        response_time_ms: Some(elapsed_ms),
                    },
                }
            }
        };

        debug!(network = %target.name, ?outcome, "Health check finished");
        HealthCheckResult::new(&target.name, checked_at, outcome)
    }

    /// Check all endpoints concurrently.
    pub async fn check_all(&self, targets: &[NetworkTarget]) -> Vec<HealthCheckResult> {
        join_all(targets.iter().map(|target| self.check(target))).await
    }
}

fn transport_reason(err: reqwest::Error) -> UnhealthyReason {
    if err.is_timeout() {
        UnhealthyReason::Timeout
    } else {
        // Drop the URL so the text stays the same across checks.
        UnhealthyReason::Connection(err.without_url().to_string())
    }
}

/// Validate a received response.
pub fn evaluate_response(
    status: u16,
    body: &str,
    elapsed_ms: u64,
    target: &NetworkTarget,
) -> HealthOutcome {
    let unhealthy = |reason| HealthOutcome::Unhealthy {
        reason,
        response_time_ms: Some(elapsed_ms),
    };

    if !(200..300).contains(&status) {
        return unhealthy(UnhealthyReason::HttpStatus(status));
    }

    let json: serde_json::Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => return unhealthy(UnhealthyReason::InvalidJson),
    };

    if let Some(reported) = json.get("status").and_then(|s| s.as_str()) {
        if !HEALTHY_STATUSES
            .iter()
            .any(|ok| ok.eq_ignore_ascii_case(reported))
        {
            return unhealthy(UnhealthyReason::BadStatus(reported.to_string()));
        }
    }

    if json.get("healthy").and_then(|h| h.as_bool()) == Some(false) {
        return unhealthy(UnhealthyReason::ReportedUnhealthy);
    }

    if let Some(limit_ms) = target.max_response_ms {
        if elapsed_ms > limit_ms {
            return unhealthy(UnhealthyReason::SlowResponse { limit_ms });
        }
    }

    let queue_size = json
        .get("queue_size")
        .or_else(|| json.get("queueSize"))
        .and_then(|q| q.as_u64());

    HealthOutcome::Healthy {
        response_time_ms: elapsed_ms,
        queue_size,
    }
}

/// Failure streak bookkeeping for one network.
#[derive(Debug, Default, Clone)]
pub struct HealthTracker {
    consecutive_failures: u32,
    down_since: Option<DateTime<Utc>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_down(&self) -> bool {
        self.consecutive_failures > 0
    }

    /// Fold a check result into the tracker and return the alerts it causes.
    pub fn observe(
        &mut self,
        result: &HealthCheckResult,
        target: &NetworkTarget,
        failure_threshold: u32,
    ) -> Vec<HealthAlert> {
        let mut alerts = Vec::new();
        let alert = |kind| HealthAlert::new(&result.network, result.checked_at, kind);

        match &result.outcome {
            HealthOutcome::Unhealthy {
                reason,
                response_time_ms,
            } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.down_since.get_or_insert(result.checked_at);

                alerts.push(alert(HealthAlertKind::Failure {
                    reason: reason.clone(),
                    response_time_ms: *response_time_ms,
                }));

                if failure_threshold > 0 && self.consecutive_failures % failure_threshold == 0 {
                    alerts.push(alert(HealthAlertKind::ConsecutiveFailures {
                        count: self.consecutive_failures,
                        last_reason: reason.clone(),
                    }));
                }
            }
            HealthOutcome::Healthy {
                response_time_ms,
                queue_size,
            } => {
                if self.is_down() {
                    alerts.push(alert(HealthAlertKind::Recovery {
                        downtime: self.down_since.map(|since| result.checked_at - since),
                        response_time_ms: *response_time_ms,
                    }));
                }
                self.consecutive_failures = 0;
                self.down_since = None;

                if let (Some(size), Some(threshold)) = (queue_size, target.queue_warning_threshold) {
                    if *size > threshold {
                        alerts.push(alert(HealthAlertKind::QueueWarning {
                            queue_size: *size,
                            threshold,
                        }));
                    }
                }
            }
        }

        alerts
    }
}
