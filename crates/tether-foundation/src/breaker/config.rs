//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one circuit breaker (and, via
/// [`BreakerRegistry`](super::BreakerRegistry), for every per-peer breaker
/// it creates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Per-call timeout; an elapsed timeout counts as a failure.
    pub call_timeout: Duration,
    /// Failure percentage (0-100) within the window that opens the circuit.
    pub error_threshold: u32,
    /// How long the circuit stays open before allowing a half-open trial.
    pub reset_timeout: Duration,
    /// Evaluation window length, in calls.
    pub window: u32,
    /// Minimum calls in the window before the failure rate is evaluated.
    /// Zero means any recorded failure is evaluated immediately.
    pub min_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(15_000),
            error_threshold: 80,
            reset_timeout: Duration::from_millis(30_000),
            window: 10,
            min_calls: 0,
        }
    }
}

impl BreakerConfig {
    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the failure percentage that opens the circuit.
    pub fn with_error_threshold(mut self, percent: u32) -> Self {
        self.error_threshold = percent.min(100);
        self
    }

    /// Set the open-state reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the evaluation window length in calls.
    pub fn with_window(mut self, calls: u32) -> Self {
        self.window = calls.max(1);
        self
    }

    /// Require a minimum call volume before evaluating the failure rate.
    pub fn with_min_calls(mut self, calls: u32) -> Self {
        self.min_calls = calls;
        self
    }
}
