//! Circuit breaker counters.
//!
//! Lock-free counters updated on every outcome; a snapshot can be exported
//! from a health or debug endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::state::State;

/// Running totals for one breaker.
#[derive(Debug, Default)]
pub struct BreakerMetrics {
    successes: AtomicU64,
    failures: AtomicU64,
    /// Calls rejected without a network attempt (circuit open).
    rejected: AtomicU64,
    transitions: AtomicU64,
}

impl BreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self, from: State, to: State) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(from = %from, to = %to, "breaker state transition");
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self, state: State) -> BreakerMetricsSnapshot {
        BreakerMetricsSnapshot {
            state,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetricsSnapshot {
    pub state: State,
    pub successes: u64,
    pub failures: u64,
    pub rejected: u64,
    pub transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = BreakerMetrics::new();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_failure();
        metrics.record_rejected();
        metrics.record_transition(State::Closed, State::Open);

        let snap = metrics.snapshot(State::Open);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 2);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.transitions, 1);
    }
}
