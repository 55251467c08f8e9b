//! Per-key alert throttling with a burst allowance.
//!
//! Each alert identity may be emitted `burst_limit` times back to back.
//! Once that budget is spent, the same alert is only emitted again after
//! `min_interval` has passed since its previous emission. A quiet period
//! longer than `burst_window` restores the full budget.
//!
//! [`AlertThrottle::should_emit`] never mutates state; only
//! [`AlertThrottle::record_emission`] does, and callers invoke it after a
//! confirmed delivery. A failed send therefore leaves the budget untouched.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identity of a recurring alert: where it comes from and what it says.
///
/// `message` is the semantic text of the condition, never the rendered
/// message, so repeated occurrences with fluctuating numbers share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub scope: String,
    pub message: String,
}

impl AlertKey {
    pub fn new(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

/// Throttle parameters, fixed for the lifetime of an [`AlertThrottle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum seconds between emissions once the burst is used up.
    pub min_interval_secs: u64,
    /// Emissions allowed before steady-state throttling applies.
    pub burst_limit: u32,
    /// Quiet seconds after which the burst budget is restored.
    pub burst_window_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 5 * 60,
            burst_limit: 3,
            burst_window_secs: 15 * 60,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThrottleConfigError {
    #[error("{field} of {secs}s is out of range")]
    OutOfRange { field: &'static str, secs: u64 },
}

fn seconds(field: &'static str, secs: u64) -> Result<Duration, ThrottleConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or(ThrottleConfigError::OutOfRange { field, secs })
}

impl ThrottleConfig {
    pub fn min_interval(&self) -> Result<Duration, ThrottleConfigError> {
        seconds("min_interval_secs", self.min_interval_secs)
    }

    pub fn burst_window(&self) -> Result<Duration, ThrottleConfigError> {
        seconds("burst_window_secs", self.burst_window_secs)
    }

    /// Check that both spans are representable.
    pub fn validate(&self) -> Result<(), ThrottleConfigError> {
        self.min_interval()?;
        self.burst_window()?;
        Ok(())
    }
}

/// Emission history of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleState {
    pub last_emitted_at: DateTime<Utc>,
    pub emitted_in_burst: u32,
}

/// Process-local throttle table keyed by [`AlertKey`].
pub struct AlertThrottle {
    min_interval: Duration,
    burst_limit: u32,
    burst_window: Duration,
    states: DashMap<AlertKey, ThrottleState>,
    /// Serializes decide-send-record sequences per key.
    locks: DashMap<AlertKey, Arc<Mutex<()>>>,
}

impl fmt::Debug for AlertThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertThrottle")
            .field("min_interval", &self.min_interval)
            .field("burst_limit", &self.burst_limit)
            .field("burst_window", &self.burst_window)
            .field("keys", &self.states.len())
            .finish()
    }
}

impl AlertThrottle {
    pub fn new(config: ThrottleConfig) -> Result<Self, ThrottleConfigError> {
        Ok(Self::with_durations(
            config.min_interval()?,
            config.burst_limit,
            config.burst_window()?,
        ))
    }

    pub fn with_durations(min_interval: Duration, burst_limit: u32, burst_window: Duration) -> Self {
        Self {
            min_interval,
            burst_limit,
            burst_window,
            states: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Decide whether `key` may be emitted at `now`. Does not modify state.
    pub fn should_emit(&self, key: &AlertKey, now: DateTime<Utc>) -> bool {
        let state = match self.states.get(key) {
            Some(state) => *state,
            // Never emitted: last emission is infinitely far in the past.
            None => return true,
        };

        let elapsed = now - state.last_emitted_at;
        let emitted = if elapsed > self.burst_window {
            0
        } else {
            state.emitted_in_burst
        };

        if emitted < self.burst_limit {
            return true;
        }

        elapsed >= self.min_interval
    }

    /// Record a successful emission of `key` at `now`.
    pub fn record_emission(&self, key: &AlertKey, now: DateTime<Utc>) {
        let mut state = self.states.entry(key.clone()).or_insert(ThrottleState {
            last_emitted_at: now,
            emitted_in_burst: 0,
        });

        if now - state.last_emitted_at > self.burst_window {
            state.emitted_in_burst = 0;
        }
        state.emitted_in_burst = state.emitted_in_burst.saturating_add(1);
        state.last_emitted_at = now;
    }

    /// Acquire the per-key lock. Hold the guard across
    /// `should_emit` → send → `record_emission` so that concurrent callers
    /// for the same key cannot both claim the last burst slot.
    pub async fn lock(&self, key: &AlertKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop keys whose last emission is older than both the burst window
    /// and the minimum interval. Such keys behave exactly like keys that
    /// were never emitted. Returns the number of removed entries.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.burst_window.max(self.min_interval);
        let before = self.states.len();
        self.states
            .retain(|_, state| now - state.last_emitted_at <= horizon);

        // Keep locks that are held or awaited by someone.
        self.locks
            .retain(|key, lock| self.states.contains_key(key) || Arc::strong_count(lock) > 1);

        before.saturating_sub(self.states.len())
    }

    /// Current state of a key, if it was ever emitted.
    pub fn state(&self, key: &AlertKey) -> Option<ThrottleState> {
        self.states.get(key).map(|state| *state)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
