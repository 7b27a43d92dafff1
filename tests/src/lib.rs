//! Tether testing utilities.
//!
//! In-process workers (channel and HTTP flavours) backed by an echo
//! capability, plus config presets with short timeouts, so end-to-end
//! dispatch flows run without a model or a network.

use async_trait::async_trait;
use axum::{Json, Router, routing::post};
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

use tether_dispatch::rpc::METHOD_INFER;
use tether_dispatch::{InferenceCapability, WorkerService};
use tether_foundation::{DispatchResult, PeerId, RequestEnvelope, RetryPolicy};
use tether_orchestrator::OrchestratorConfig;
use tether_transport::{CallOptions, ChannelHandler, serve_channel};

/// Inference capability that echoes the shaped prompt back.
pub struct EchoCapability;

#[async_trait]
impl InferenceCapability for EchoCapability {
    async fn infer(&self, request: &RequestEnvelope) -> DispatchResult<Value> {
        Ok(json!({
            "model": request.model.clone().unwrap_or_else(|| "default".to_string()),
            "output": request.chat_prompt(),
            "max_tokens": request.max_tokens,
            "provider": "echo",
        }))
    }
}

static NEXT_PEER: AtomicU8 = AtomicU8::new(1);

/// A unique peer identity per call (identities are opaque in tests).
pub fn fresh_peer() -> PeerId {
    let byte = NEXT_PEER.fetch_add(1, Ordering::SeqCst);
    PeerId::from_bytes([byte; 32])
}

/// Spawn an echo worker serving the peer channel on an ephemeral port.
/// Returns its identity and channel address.
pub async fn spawn_worker_channel(model: &str) -> (PeerId, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let service = Arc::new(WorkerService::new(model, Arc::new(EchoCapability)));
    tokio::spawn(serve_channel(listener, service));
    (fresh_peer(), addr)
}

/// Spawn an echo worker serving `POST /infer` over HTTP on an ephemeral
/// port. Returns its base URL (the fallback transport's address).
pub async fn spawn_worker_http(model: &str) -> String {
    let service = Arc::new(WorkerService::new(model, Arc::new(EchoCapability)));
    let app = Router::new().route(
        "/infer",
        post(move |Json(payload): Json<Value>| {
            let service = Arc::clone(&service);
            async move {
                Json(ChannelHandler::handle(service.as_ref(), METHOD_INFER, payload).await)
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(axum::serve(listener, app).into_future());
    base_url
}

/// Orchestrator config with timeouts short enough for tests.
pub fn test_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        call: CallOptions {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(1_000),
        },
        retry: RetryPolicy {
            retries: 1,
            min_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(80),
            factor: 2.0,
            randomize: false,
        },
        ..Default::default()
    }
}
