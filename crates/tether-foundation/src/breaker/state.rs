//! Circuit breaker state machine.
//!
//! Three states:
//! - Closed: calls pass through; outcomes feed a rolling call-count window.
//!   When the failure percentage in the window reaches the threshold the
//!   circuit opens.
//! - Open: calls fail immediately with `BreakerOpen` (no network attempt)
//!   until the reset timeout elapses.
//! - HalfOpen: exactly one trial call goes through. Success closes the
//!   circuit; failure reopens it with a fresh timestamp.
//!
//! The inner lock protects counters only; it is never held across the
//! awaited call.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{DispatchError, DispatchResult};
use crate::peer::PeerId;

use super::config::BreakerConfig;
use super::metrics::BreakerMetrics;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

struct BreakerInner {
    state: State,
    /// Calls recorded in the current window.
    window_calls: u32,
    /// Failures recorded in the current window.
    window_failures: u32,
    /// When the circuit last transitioned to Open.
    opened_at: Option<Instant>,
    /// A half-open trial call is currently in flight.
    probe_in_flight: bool,
}

/// Failure-tripped fast-fail gate with automatic recovery probing.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: BreakerMetrics,
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: State::Closed,
                window_calls: 0,
                window_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            metrics: BreakerMetrics::new(),
        }
    }

    /// Execute `op` under breaker protection and the per-call timeout.
    ///
    /// An open circuit fails immediately with `BreakerOpen`; a call that
    /// outlives `call_timeout` is abandoned, counted as a failure, and
    /// surfaced as `CallTimeout`.
    pub async fn fire<T, Fut>(&self, op: Fut) -> DispatchResult<T>
    where
        Fut: Future<Output = DispatchResult<T>>,
    {
        self.try_acquire()?;
        match tokio::time::timeout(self.config.call_timeout, op).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(DispatchError::CallTimeout(self.config.call_timeout))
            }
        }
    }

    /// Current state, applying the Open → HalfOpen timeout transition.
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Counter snapshot for introspection endpoints.
    pub fn metrics_snapshot(&self) -> super::metrics::BreakerMetricsSnapshot {
        self.metrics.snapshot(self.state())
    }

    /// Admission check: may this call proceed?
    fn try_acquire(&self) -> DispatchResult<()> {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        match inner.state {
            State::Closed => Ok(()),
            State::Open => {
                self.metrics.record_rejected();
                Err(DispatchError::BreakerOpen)
            }
            State::HalfOpen => {
                if inner.probe_in_flight {
                    self.metrics.record_rejected();
                    Err(DispatchError::BreakerOpen)
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.metrics.record_success();
        match inner.state {
            State::HalfOpen => {
                inner.probe_in_flight = false;
                inner.opened_at = None;
                inner.window_calls = 0;
                inner.window_failures = 0;
                inner.state = State::Closed;
                self.metrics.record_transition(State::HalfOpen, State::Closed);
            }
            State::Closed => {
                inner.window_calls += 1;
                self.roll_window(&mut inner);
            }
            // A call admitted before the circuit opened finished late;
            // nothing to update.
            State::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.metrics.record_failure();
        match inner.state {
            State::HalfOpen => {
                inner.probe_in_flight = false;
                inner.opened_at = Some(Instant::now());
                inner.state = State::Open;
                self.metrics.record_transition(State::HalfOpen, State::Open);
            }
            State::Closed => {
                inner.window_calls += 1;
                inner.window_failures += 1;
                if inner.window_calls >= self.config.min_calls.max(1) {
                    let rate = inner.window_failures * 100 / inner.window_calls;
                    if rate >= self.config.error_threshold {
                        inner.opened_at = Some(Instant::now());
                        inner.state = State::Open;
                        self.metrics.record_transition(State::Closed, State::Open);
                        return;
                    }
                }
                self.roll_window(&mut inner);
            }
            State::Open => {}
        }
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner) {
        if inner.state == State::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.reset_timeout {
                    inner.state = State::HalfOpen;
                    inner.probe_in_flight = false;
                    self.metrics.record_transition(State::Open, State::HalfOpen);
                }
            }
        }
    }

    fn roll_window(&self, inner: &mut BreakerInner) {
        if inner.window_calls >= self.config.window {
            inner.window_calls = 0;
            inner.window_failures = 0;
        }
    }
}

/// Per-destination breakers, keyed by peer identity and created lazily.
///
/// Breakers must outlive individual requests; constructing fresh breaker
/// state per call would erase trip memory and defeat the pattern.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<PeerId, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create a registry applying `config` to every destination.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `peer`, created race-free on first use.
    pub fn for_peer(&self, peer: &PeerId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(*peer)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone())))
            .clone()
    }

    /// Number of destinations with materialized breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(threshold: u32, window: u32, reset_ms: u64) -> BreakerConfig {
        BreakerConfig::default()
            .with_error_threshold(threshold)
            .with_window(window)
            .with_reset_timeout(Duration::from_millis(reset_ms))
            .with_call_timeout(Duration::from_millis(200))
    }

    async fn ok(breaker: &CircuitBreaker) -> DispatchResult<u32> {
        breaker.fire(async { Ok(1) }).await
    }

    async fn fail(breaker: &CircuitBreaker) -> DispatchResult<u32> {
        breaker
            .fire(async { Err(DispatchError::Connection("refused".into())) })
            .await
    }

    #[tokio::test]
    async fn closed_passes_calls_through() {
        let breaker = CircuitBreaker::new(config(50, 10, 30_000));
        assert_eq!(ok(&breaker).await.unwrap(), 1);
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn trips_open_on_failure_rate_within_window() {
        let breaker = CircuitBreaker::new(config(50, 10, 60_000));
        let attempted = AtomicUsize::new(0);

        // 3 failures among the first 4 calls; threshold 50%, window 10.
        let _ = ok(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), State::Open);

        // The 5th call must not reach the real operation.
        let result = breaker
            .fire(async {
                attempted.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await;
        assert!(matches!(result, Err(DispatchError::BreakerOpen)));
        assert_eq!(attempted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_fast_fails_without_network_attempt() {
        let breaker = CircuitBreaker::new(config(50, 10, 60_000));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), State::Open);

        let result = ok(&breaker).await;
        assert!(matches!(result, Err(DispatchError::BreakerOpen)));
    }

    #[tokio::test]
    async fn half_open_allows_exactly_one_trial() {
        let breaker = Arc::new(CircuitBreaker::new(config(50, 10, 50)));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), State::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(breaker.state(), State::HalfOpen);

        // Start a slow trial call, then race a second call against it.
        let trial = {
            let breaker = Arc::clone(&breaker);
            tokio::spawn(async move {
                breaker
                    .fire(async {
                        tokio::time::sleep(Duration::from_millis(60)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = ok(&breaker).await;
        assert!(matches!(second, Err(DispatchError::BreakerOpen)));

        assert_eq!(trial.await.unwrap().unwrap(), 1);
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(50, 10, 40));
        let _ = fail(&breaker).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(breaker.state(), State::HalfOpen);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), State::Open);

        // The fresh Open timestamp means another full reset wait.
        let result = ok(&breaker).await;
        assert!(matches!(result, Err(DispatchError::BreakerOpen)));
    }

    #[tokio::test]
    async fn call_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(
            config(50, 10, 60_000).with_call_timeout(Duration::from_millis(30)),
        );
        let result: DispatchResult<u32> = breaker
            .fire(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            })
            .await;
        assert!(matches!(result, Err(DispatchError::CallTimeout(_))));
        assert_eq!(breaker.state(), State::Open);
    }

    #[tokio::test]
    async fn successes_keep_rate_below_threshold() {
        let breaker = CircuitBreaker::new(config(60, 10, 60_000));
        let _ = ok(&breaker).await;
        let _ = ok(&breaker).await;
        let _ = fail(&breaker).await;
        // 1 failure / 3 calls = 33% < 60%.
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn registry_returns_same_breaker_per_peer() {
        let registry = BreakerRegistry::new(config(50, 10, 60_000));
        let a = PeerId::from_bytes([1; 32]);
        let b = PeerId::from_bytes([2; 32]);

        let breaker_a = registry.for_peer(&a);
        let _ = breaker_a
            .fire(async { Err::<u32, _>(DispatchError::Connection("down".into())) })
            .await;
        assert_eq!(registry.for_peer(&a).state(), State::Open);
        // Peer B's breaker is untouched.
        assert_eq!(registry.for_peer(&b).state(), State::Closed);
        assert_eq!(registry.len(), 2);
    }
}
