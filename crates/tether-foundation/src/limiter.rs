//! Per-tenant admission control.
//!
//! Each tenant gets an independent budget: a refilling token reservoir
//! bounding request rate, plus a concurrency ceiling bounding in-flight
//! work. Budgets are created lazily on first use and live for the process
//! lifetime; one tenant exhausting its reservoir never throttles another.
//!
//! The default policy is backpressure, not rejection: operations queue
//! (FIFO within a tenant) until admitted. Rejection only happens under an
//! explicit caller-imposed admission timeout.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::error::{DispatchError, DispatchResult};

/// Tenant budget parameters. One config applies to every tenant; budgets
/// themselves are per-tenant.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Reservoir capacity: tokens available before waiting for a refill.
    pub reservoir: u32,
    /// Fixed refill period.
    pub refill_interval: Duration,
    /// Tokens added per elapsed period (capped at `reservoir`).
    pub refill_amount: u32,
    /// Maximum simultaneously executing operations per tenant.
    pub max_concurrent: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            reservoir: 5,
            refill_interval: Duration::from_millis(1000),
            refill_amount: 5,
            max_concurrent: 2,
        }
    }
}

struct ReservoirState {
    tokens: u32,
    last_refill: Instant,
}

/// Lazily-created per-tenant budget.
struct TenantBudget {
    /// Token reservoir. The async mutex is fair, which gives per-tenant
    /// FIFO admission: waiters park here in arrival order, including
    /// across refill sleeps.
    reservoir: Mutex<ReservoirState>,
    /// Concurrency ceiling.
    slots: Semaphore,
}

impl TenantBudget {
    fn new(config: &LimiterConfig) -> Self {
        Self {
            reservoir: Mutex::new(ReservoirState {
                tokens: config.reservoir,
                last_refill: Instant::now(),
            }),
            slots: Semaphore::new(config.max_concurrent.max(1)),
        }
    }

    /// Take one token, sleeping through refill periods as needed.
    ///
    /// Holding the reservoir lock across the sleep is intentional: it
    /// serializes same-tenant waiters in FIFO order. The lock is per
    /// tenant, so unrelated tenants are unaffected.
    async fn acquire_token(&self, config: &LimiterConfig) {
        let mut state = self.reservoir.lock().await;
        loop {
            Self::refill(&mut state, config);
            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }
            let next_refill = state.last_refill + config.refill_interval;
            tokio::time::sleep_until(next_refill).await;
        }
    }

    fn refill(state: &mut ReservoirState, config: &LimiterConfig) {
        let elapsed = state.last_refill.elapsed();
        if elapsed < config.refill_interval {
            return;
        }
        let periods = (elapsed.as_nanos() / config.refill_interval.as_nanos().max(1)) as u32;
        let refilled = periods.saturating_mul(config.refill_amount);
        state.tokens = state.tokens.saturating_add(refilled).min(config.reservoir);
        state.last_refill += config.refill_interval * periods;
    }
}

/// Keyed admission controller: one independent [`TenantBudget`] per tenant
/// key, created race-free on first use.
pub struct TenantLimiter {
    config: LimiterConfig,
    budgets: DashMap<String, Arc<TenantBudget>>,
}

impl TenantLimiter {
    /// Create a limiter applying `config` to every tenant.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            budgets: DashMap::new(),
        }
    }

    fn budget(&self, tenant: &str) -> Arc<TenantBudget> {
        self.budgets
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(TenantBudget::new(&self.config)))
            .clone()
    }

    /// Execute `op` once the tenant's budget admits it: one reservoir
    /// token, then a concurrency slot (held for the duration of `op`).
    /// Queues indefinitely: backpressure, not rejection.
    pub async fn schedule<T, Fut>(&self, tenant: &str, op: Fut) -> DispatchResult<T>
    where
        Fut: Future<Output = DispatchResult<T>>,
    {
        let budget = self.budget(tenant);
        budget.acquire_token(&self.config).await;
        let _slot = budget
            .slots
            .acquire()
            .await
            .map_err(|_| DispatchError::Internal("tenant budget closed".to_string()))?;
        op.await
    }

    /// Like [`schedule`](Self::schedule), but fail with
    /// [`DispatchError::LimiterSaturated`] when admission (token + slot)
    /// takes longer than `admission_timeout`. Once admitted, `op` itself is
    /// not bounded by this timeout.
    pub async fn schedule_with_timeout<T, Fut>(
        &self,
        tenant: &str,
        admission_timeout: Duration,
        op: Fut,
    ) -> DispatchResult<T>
    where
        Fut: Future<Output = DispatchResult<T>>,
    {
        let budget = self.budget(tenant);
        let admission = async {
            budget.acquire_token(&self.config).await;
            budget.slots.acquire().await
        };
        match tokio::time::timeout(admission_timeout, admission).await {
            Ok(Ok(_slot)) => op.await,
            Ok(Err(_)) => Err(DispatchError::Internal("tenant budget closed".to_string())),
            Err(_) => {
                tracing::warn!(tenant = %tenant, "admission wait timed out");
                Err(DispatchError::LimiterSaturated(tenant.to_string()))
            }
        }
    }

    /// Number of tenants with materialized budgets.
    pub fn tenant_count(&self) -> usize {
        self.budgets.len()
    }
}
