//! Reconciler configuration.
//!
//! Polling cadence and wait budgets are configuration, not constants. Options
//! can be built in code with the `with_*` helpers or deserialized from the
//! JSON a host already has (durations are given in milliseconds):
//!
//! ```
//! use hemmer_reconciler::ReconcilerOptions;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let options = ReconcilerOptions::from_json(json!({
//!     "poll": {"initial_interval_ms": 500, "multiplier": 1.5},
//!     "consistency_window_ms": 60000
//! }))
//! .unwrap();
//!
//! assert_eq!(options.poll.initial_interval, Duration::from_millis(500));
//! assert_eq!(options.consistency_window, Duration::from_secs(60));
//! // Unspecified fields keep their defaults.
//! assert_eq!(options.poll.max_interval, Duration::from_secs(30));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How an [`OperationHandle`](crate::OperationHandle) is polled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before the second poll.
    #[serde(rename = "initial_interval_ms", with = "millis")]
    pub initial_interval: Duration,
    /// Upper bound on the delay between polls.
    #[serde(rename = "max_interval_ms", with = "millis")]
    pub max_interval: Duration,
    /// Factor applied to the delay after each poll. Values below 1 are treated as 1.
    pub multiplier: f64,
    /// Budget used when the caller does not supply one.
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PollPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fixed interval with no backoff.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            ..Self::default()
        }
    }

    /// Set the initial interval.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum interval.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the default wait budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The delay to use after `current`.
    ///
    /// Never exceeds `max(max_interval, initial_interval)`, however large the
    /// multiplier.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let cap = self.max_interval.max(self.initial_interval);
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
            .map_or(cap, |next| next.min(cap))
    }
}

/// Options for a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerOptions {
    /// Polling for asynchronous operations.
    pub poll: PollPolicy,
    /// How long a deleted resource may keep showing up in reads.
    #[serde(rename = "consistency_window_ms", with = "millis")]
    pub consistency_window: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            consistency_window: Duration::from_secs(5 * 60),
        }
    }
}

impl ReconcilerOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON object. Missing fields take defaults.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Set the poll policy.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Set the eventual-consistency window.
    pub fn with_consistency_window(mut self, window: Duration) -> Self {
        self.consistency_window = window;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_caps_at_max() {
        let policy = PollPolicy::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(5))
            .with_multiplier(2.0);

        let mut interval = policy.initial_interval;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(interval.as_secs());
            interval = policy.next_interval(interval);
        }
        assert_eq!(seen, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_degenerate_multiplier() {
        let policy = PollPolicy::fixed(Duration::from_secs(3)).with_multiplier(0.1);
        assert_eq!(policy.next_interval(Duration::from_secs(3)), Duration::from_secs(3));

        let policy = policy.with_multiplier(f64::NAN);
        assert_eq!(policy.next_interval(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn test_huge_multiplier_saturates_at_cap() {
        let options = ReconcilerOptions::from_json(json!({"poll": {"multiplier": 1e300}})).unwrap();
        let poll = &options.poll;
        assert_eq!(poll.next_interval(poll.initial_interval), poll.max_interval);
        assert_eq!(poll.next_interval(poll.max_interval), poll.max_interval);

        let policy = PollPolicy::new().with_multiplier(f64::MAX);
        assert_eq!(
            policy.next_interval(Duration::from_secs(u64::MAX / 2)),
            policy.max_interval
        );
    }

    #[test]
    fn test_max_below_initial_does_not_shrink() {
        let policy = PollPolicy::new()
            .with_initial_interval(Duration::from_secs(10))
            .with_max_interval(Duration::from_secs(1));
        assert_eq!(policy.next_interval(Duration::from_secs(10)), Duration::from_secs(10));
    }

    #[test]
    fn test_from_json_defaults() {
        let options = ReconcilerOptions::from_json(json!({})).unwrap();
        assert_eq!(options, ReconcilerOptions::default());
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        assert!(ReconcilerOptions::from_json(json!({"consistency_window_ms": "soon"})).is_err());
    }

    #[test]
    fn test_serialize_millis() {
        let json = serde_json::to_value(PollPolicy::fixed(Duration::from_millis(250))).unwrap();
        assert_eq!(json["initial_interval_ms"], 250);
        assert_eq!(json["max_interval_ms"], 250);
        assert_eq!(json["multiplier"], 1.0);
    }
}
