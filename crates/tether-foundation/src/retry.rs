//! Bounded retry with exponential backoff and jitter.
//!
//! The retry loop wraps the circuit breaker, not the other way around: a
//! retry attempt can legitimately re-enter an open breaker and fail again
//! immediately. That is fine (breaker fast-fail is cheap), but retries do
//! not "wait out" an open circuit; only the breaker's reset timeout does.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DispatchError, DispatchResult};

/// Backoff parameters for [`RetryExecutor`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first (total attempts = retries + 1).
    pub retries: u32,
    /// Base delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound on any delay, jitter included.
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub factor: f64,
    /// Randomize each delay by a uniform multiplier in [1, 2) to avoid
    /// synchronized retry storms across concurrent callers.
    pub randomize: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(1500),
            factor: 2.0,
            randomize: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry attempt `k` (1-indexed):
    /// `min(max_delay, min_delay * factor^(k-1))`, then jittered.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1).min(16) as i32);
        let base = self.min_delay.as_secs_f64() * exp;
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = if self.randomize {
            capped * rand::thread_rng().gen_range(1.0..2.0)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

/// Retry wrapper around a fallible operation.
///
/// Only transient failures are retried; terminal failures (validation,
/// empty registry, upstream protocol errors) propagate on first
/// occurrence. Exhausting all retries surfaces the last observed failure
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The configured policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying transient failures up to the configured bound.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> DispatchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DispatchResult<T>>,
    {
        let total_attempts = self.policy.retries + 1;
        let mut last_err: Option<DispatchError> = None;

        for attempt in 1..=total_attempts {
            if attempt > 1 {
                let delay = self.policy.delay(attempt - 1);
                debug!(
                    attempt,
                    total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < total_attempts => {
                    warn!(attempt, error = %err, "transient failure, will retry");
                    last_err = Some(err);
                }
                Err(err) => {
                    if !err.is_transient() {
                        debug!(error = %err, "terminal failure, not retrying");
                    }
                    return Err(err);
                }
            }
        }

        // Unreachable: the loop always returns on the last attempt.
        Err(last_err.unwrap_or_else(|| DispatchError::Internal("retry loop exhausted".into())))
    }
}
