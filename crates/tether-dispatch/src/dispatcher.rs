//! The dispatcher: one request through the full resilience pipeline.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use tether_foundation::breaker::BreakerRegistry;
use tether_foundation::{
    DispatchError, PeerId, RequestEnvelope, ResponseEnvelope, RetryExecutor, TenantLimiter,
    WorkerRegistry,
};
use tether_transport::{DualTransportClient, with_deadline};

use crate::rpc::{METHOD_INFER, METHOD_SCHEDULE};

/// Where one dispatch goes: a peer and the logical method to invoke on it.
#[derive(Debug, Clone)]
pub struct CallTarget {
    pub peer: PeerId,
    pub method: &'static str,
}

/// Resolves a model preference to a call target. The two hops differ only
/// here: the orchestrator selects a worker, the gateway always addresses
/// its upstream orchestrator.
pub trait TargetResolver: Send + Sync {
    fn resolve(&self, model: Option<&str>) -> Option<CallTarget>;
}

/// Orchestrator-hop resolver: pick a worker from the registry, invoke
/// `infer` on it.
pub struct WorkerPool {
    registry: Arc<WorkerRegistry>,
}

impl WorkerPool {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

impl TargetResolver for WorkerPool {
    fn resolve(&self, model: Option<&str>) -> Option<CallTarget> {
        self.registry.select(model).map(|record| CallTarget {
            peer: record.peer,
            method: METHOD_INFER,
        })
    }
}

/// Gateway-hop resolver: a fixed upstream orchestrator, invoked with
/// `schedule`. `None` when no orchestrator identity was discovered; the
/// dispatch then fails terminally, without engaging limiter or breaker.
pub struct FixedUpstream {
    peer: Option<PeerId>,
}

impl FixedUpstream {
    pub fn new(peer: Option<PeerId>) -> Self {
        Self { peer }
    }
}

impl TargetResolver for FixedUpstream {
    fn resolve(&self, _model: Option<&str>) -> Option<CallTarget> {
        self.peer.map(|peer| CallTarget {
            peer,
            method: METHOD_SCHEDULE,
        })
    }
}

/// Top-level orchestration: canonicalize, resolve, execute, envelope.
pub struct Dispatcher {
    resolver: Arc<dyn TargetResolver>,
    limiter: Arc<TenantLimiter>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryExecutor,
    client: Arc<DualTransportClient>,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn TargetResolver>,
        limiter: Arc<TenantLimiter>,
        breakers: Arc<BreakerRegistry>,
        retry: RetryExecutor,
        client: Arc<DualTransportClient>,
    ) -> Self {
        Self {
            resolver,
            limiter,
            breakers,
            retry,
            client,
        }
    }

    /// Dispatch one raw payload. Always produces an envelope; no error
    /// crosses this boundary unwrapped.
    pub async fn dispatch(&self, payload: &Value, tenant_hint: Option<&str>) -> ResponseEnvelope {
        let envelope = match RequestEnvelope::canonicalize(payload) {
            Ok(envelope) => envelope,
            Err(err) => return ResponseEnvelope::failed(&err),
        };
        let tenant = envelope.tenant_key(tenant_hint);

        let Some(target) = self.resolver.resolve(envelope.model.as_deref()) else {
            debug!(tenant = %tenant, "no dispatch target");
            return ResponseEnvelope::failed(&DispatchError::NoWorkersAvailable);
        };

        let wire = match serde_json::to_value(&envelope) {
            Ok(wire) => wire,
            Err(e) => {
                return ResponseEnvelope::failed(&DispatchError::Internal(format!(
                    "envelope serialization: {e}"
                )));
            }
        };

        // Persistent per-peer breaker: trip memory survives this request.
        let breaker = self.breakers.for_peer(&target.peer);
        let outcome = self
            .limiter
            .schedule(
                &tenant,
                self.retry
                    .run(|| breaker.fire(self.client.call(&target.peer, target.method, &wire))),
            )
            .await;

        match outcome {
            Ok(value) => ResponseEnvelope::from_wire(value),
            Err(err) => {
                warn!(
                    tenant = %tenant,
                    peer = %target.peer.short(),
                    error = %err,
                    "dispatch failed"
                );
                ResponseEnvelope::failed(&err)
            }
        }
    }

    /// [`dispatch`](Self::dispatch) under an overall caller deadline. On
    /// expiry the in-flight work is abandoned (dropped, releasing any
    /// transport resource) and a timeout envelope is returned.
    pub async fn dispatch_with_deadline(
        &self,
        payload: &Value,
        tenant_hint: Option<&str>,
        deadline: Duration,
    ) -> ResponseEnvelope {
        match with_deadline(deadline, async {
            Ok(self.dispatch(payload, tenant_hint).await)
        })
        .await
        {
            Ok(envelope) => envelope,
            Err(err) => ResponseEnvelope::failed(&err),
        }
    }
}
