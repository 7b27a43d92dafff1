//! Transport-agnostic RPC method surface.
//!
//! The same logical methods are exposed over the peer channel and the HTTP
//! boundary with equivalent semantics:
//!
//! | Method | Request | Response |
//! |--------|---------|----------|
//! | `health` | — | `{status:"ok", service, ...}` |
//! | `register-worker` | `{identity, model, capabilities?, ...}` | `{status:"ok"}` or failed envelope |
//! | `schedule` / `infer` | request payload | response envelope |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use tether_foundation::{
    DispatchError, PeerId, ResponseEnvelope, WorkerRecord, WorkerRegistry,
};
use tether_transport::ChannelHandler;

use crate::dispatcher::Dispatcher;

pub const METHOD_HEALTH: &str = "health";
pub const METHOD_REGISTER_WORKER: &str = "register-worker";
pub const METHOD_SCHEDULE: &str = "schedule";
pub const METHOD_INFER: &str = "infer";

/// Wire shape of a worker registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub identity: PeerId,
    pub model: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
    /// Socket address of the worker's peer channel listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_addr: Option<String>,
    /// Base URL of the worker's HTTP surface, for the fallback transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_addr: Option<String>,
}

type RegisterHook = Box<dyn Fn(&RegisterWorkerRequest) + Send + Sync>;

/// Orchestrator-side method surface wiring the registry and dispatcher.
pub struct RpcService {
    service: String,
    registry: Arc<WorkerRegistry>,
    dispatcher: Arc<Dispatcher>,
    /// Invoked after a successful registration, so transports can learn
    /// the worker's routes.
    register_hook: Option<RegisterHook>,
}

impl RpcService {
    /// Create a service named `service` (reported by `health`).
    pub fn new(
        service: impl Into<String>,
        registry: Arc<WorkerRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            service: service.into(),
            registry,
            dispatcher,
            register_hook: None,
        }
    }

    /// Run `hook` after every successful registration.
    pub fn with_register_hook(
        mut self,
        hook: impl Fn(&RegisterWorkerRequest) + Send + Sync + 'static,
    ) -> Self {
        self.register_hook = Some(Box::new(hook));
        self
    }

    /// Answer one method call. Every answer is a JSON value; failures are
    /// failed envelopes, never a panic or a raw error.
    pub async fn handle(&self, method: &str, payload: Value) -> Value {
        match method {
            METHOD_HEALTH => json!({
                "status": "ok",
                "service": self.service,
                "workers": self.registry.len(),
            }),
            METHOD_REGISTER_WORKER => self.handle_register(payload),
            METHOD_SCHEDULE | METHOD_INFER => {
                let tenant_hint = payload
                    .get("tenant_id")
                    .and_then(Value::as_str)
                    .map(String::from);
                let envelope = self
                    .dispatcher
                    .dispatch(&payload, tenant_hint.as_deref())
                    .await;
                envelope_to_value(envelope)
            }
            other => {
                warn!(method = %other, "unknown rpc method");
                json!({
                    "status": "failed",
                    "error": "Unknown method",
                    "details": format!("'{other}' is not served here"),
                })
            }
        }
    }

    fn handle_register(&self, payload: Value) -> Value {
        let request: RegisterWorkerRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                return envelope_to_value(ResponseEnvelope::failed(
                    &DispatchError::InvalidRegistration(e.to_string()),
                ));
            }
        };

        let record = WorkerRecord {
            peer: request.identity,
            model: request.model.clone(),
            capabilities: request.capabilities.clone(),
            http_addr: request.http_addr.clone(),
        };
        match self.registry.register(record) {
            Ok(()) => {
                if let Some(hook) = &self.register_hook {
                    hook(&request);
                }
                json!({"status": "ok"})
            }
            Err(err) => envelope_to_value(ResponseEnvelope::failed(&err)),
        }
    }

    /// Registry snapshot for introspection endpoints.
    pub fn workers(&self) -> Vec<WorkerRecord> {
        self.registry.list()
    }
}

fn envelope_to_value(envelope: ResponseEnvelope) -> Value {
    serde_json::to_value(envelope)
        .unwrap_or_else(|_| json!({"status": "failed", "error": "Internal error"}))
}

#[async_trait]
impl ChannelHandler for RpcService {
    async fn handle(&self, method: &str, payload: Value) -> Value {
        RpcService::handle(self, method, payload).await
    }
}
