//! The inference seam and the worker-side service.
//!
//! Model execution is a black box to the dispatch layer: some capability
//! turns a canonical request into a result payload. Workers wrap their
//! capability in [`WorkerService`] to serve it over any transport.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use tether_foundation::{DispatchResult, RequestEnvelope, ResponseEnvelope};
use tether_transport::ChannelHandler;

use crate::rpc::{METHOD_HEALTH, METHOD_INFER};

/// Black-box inference: canonical request in, opaque result payload out.
#[async_trait]
pub trait InferenceCapability: Send + Sync {
    async fn infer(&self, request: &RequestEnvelope) -> DispatchResult<Value>;
}

/// Worker-side method surface: `health` and `infer`, answered from the
/// wrapped capability.
pub struct WorkerService {
    model: String,
    capability: std::sync::Arc<dyn InferenceCapability>,
}

impl WorkerService {
    /// Create a service advertising `model` and answering with `capability`.
    pub fn new(model: impl Into<String>, capability: std::sync::Arc<dyn InferenceCapability>) -> Self {
        Self {
            model: model.into(),
            capability,
        }
    }
}

#[async_trait]
impl ChannelHandler for WorkerService {
    async fn handle(&self, method: &str, payload: Value) -> Value {
        match method {
            METHOD_HEALTH => json!({
                "status": "ok",
                "service": "worker",
                "model": self.model,
            }),
            METHOD_INFER => {
                let envelope = match RequestEnvelope::canonicalize(&payload) {
                    Ok(envelope) => envelope,
                    Err(err) => return serde_json::to_value(ResponseEnvelope::failed(&err))
                        .unwrap_or(Value::Null),
                };
                match self.capability.infer(&envelope).await {
                    // Bare result object; the dispatching side wraps it.
                    Ok(result) => result,
                    Err(err) => {
                        warn!(model = %self.model, error = %err, "inference failed");
                        serde_json::to_value(ResponseEnvelope::failed(&err)).unwrap_or(Value::Null)
                    }
                }
            }
            other => json!({
                "status": "failed",
                "error": "Unknown method",
                "details": format!("worker does not serve '{other}'"),
            }),
        }
    }
}
