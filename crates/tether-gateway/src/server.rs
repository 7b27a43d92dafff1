//! Axum-based gateway server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, reports upstream key presence. |
//! | `POST` | `/infer` | Dispatch one inference request upstream. |

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use tether_dispatch::{Dispatcher, FixedUpstream};
use tether_foundation::breaker::{BreakerConfig, BreakerRegistry};
use tether_foundation::{
    DispatchResult, LimiterConfig, PeerId, RetryExecutor, RetryPolicy, TenantLimiter,
};
use tether_transport::{CallOptions, DualTransportClient, HttpFallback, TcpPeerConnector};

use crate::error::{GatewayError, RETRY_AFTER_SECS, status_for};

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    /// `None` until an orchestrator identity is configured; requests are
    /// answered 503 without engaging the pipeline.
    upstream: Option<PeerId>,
    /// Overall per-request deadline imposed on a dispatch.
    request_deadline: Duration,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, upstream: Option<PeerId>, request_deadline: Duration) -> Self {
        Self {
            dispatcher,
            upstream,
            request_deadline,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration for [`GatewayServer`].
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    /// TCP port to listen on (default: 8080).
    pub port: u16,
    /// Upstream orchestrator peer identity, when discovered.
    pub orchestrator_key: Option<PeerId>,
    /// Socket address of the orchestrator's peer-channel listener.
    pub orchestrator_channel_addr: Option<String>,
    /// Base URL of the orchestrator's HTTP surface (fallback transport).
    pub orchestrator_http_url: String,
    /// Overall per-request deadline.
    pub request_deadline: Duration,
    pub limiter: LimiterConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub call: CallOptions,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            orchestrator_key: None,
            orchestrator_channel_addr: None,
            orchestrator_http_url: "http://tether-orchestrator:4000".to_string(),
            request_deadline: Duration::from_millis(30_000),
            limiter: LimiterConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            call: CallOptions::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level gateway server wiring the dispatch pipeline to axum.
pub struct GatewayServer {
    config: GatewayServerConfig,
}

impl GatewayServer {
    pub fn new(config: GatewayServerConfig) -> Self {
        Self { config }
    }

    /// Build the axum app: dispatcher over a fixed upstream, permissive
    /// CORS (browser calls arrive from anywhere in dev).
    pub fn build_app(&self) -> DispatchResult<Router> {
        let connector = Arc::new(TcpPeerConnector::new());
        if let (Some(key), Some(addr)) = (
            self.config.orchestrator_key,
            self.config.orchestrator_channel_addr.as_deref(),
        ) {
            connector.add_route(key, addr);
        }
        let fallback = Arc::new(HttpFallback::new(
            self.config.call.request_timeout,
            Some(self.config.orchestrator_http_url.clone()),
        )?);

        let client = Arc::new(DualTransportClient::new(
            connector,
            fallback,
            self.config.call.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(FixedUpstream::new(self.config.orchestrator_key)),
            Arc::new(TenantLimiter::new(self.config.limiter.clone())),
            Arc::new(BreakerRegistry::new(self.config.breaker.clone())),
            RetryExecutor::new(self.config.retry.clone()),
            client,
        ));

        let state = AppState::new(
            dispatcher,
            self.config.orchestrator_key,
            self.config.request_deadline,
        );
        Ok(build_router(state))
    }

    /// Bind to `0.0.0.0:{port}` and serve until the process exits.
    pub async fn start(self) -> std::io::Result<()> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        let app = self.build_app().map_err(std::io::Error::other)?;
        info!(addr = %addr, "gateway starting");
        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await
    }
}

/// Assemble the router from prepared state (tests inject their own).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/infer", post(infer_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health` — liveness and upstream-key presence.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "gateway",
        "orchestrator_key_present": state.upstream.is_some(),
    }))
}

/// `POST /infer` — dispatch one request upstream and map the envelope.
async fn infer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    // A missing upstream identity is answered directly; it must not count
    // against the tenant's budget or the breaker.
    if state.upstream.is_none() {
        return GatewayError::UpstreamNotConfigured.into_response();
    }

    let tenant_hint = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let envelope = state
        .dispatcher
        .dispatch_with_deadline(&payload, tenant_hint.as_deref(), state.request_deadline)
        .await;

    let status = status_for(&envelope);
    let mut response = (status, Json(envelope)).into_response();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        if let Ok(value) = RETRY_AFTER_SECS.parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn app(with_key: bool) -> Router {
        // No live orchestrator behind these tests: the channel route is
        // absent and the fallback URL points at a closed port, so a
        // dispatched request fails at the transport layer.
        let config = GatewayServerConfig {
            orchestrator_key: with_key.then(|| PeerId::from_bytes([8; 32])),
            orchestrator_http_url: "http://127.0.0.1:1".to_string(),
            request_deadline: Duration::from_millis(2_000),
            retry: RetryPolicy::no_retry(),
            call: CallOptions {
                connect_timeout: Duration::from_millis(200),
                request_timeout: Duration::from_millis(200),
            },
            ..Default::default()
        };
        GatewayServer::new(config).build_app().unwrap()
    }

    async fn post_infer(app: Router, payload: Value) -> (StatusCode, Value, Option<String>) {
        let response = app
            .oneshot(
                Request::post("/infer")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), retry_after)
    }

    #[tokio::test]
    async fn health_reports_key_presence() {
        let response = app(false)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["service"], "gateway");
        assert_eq!(body["orchestrator_key_present"], false);
    }

    #[tokio::test]
    async fn missing_key_is_503_without_dispatch() {
        let (status, body, _) = post_infer(app(false), json!({"input": "Hi"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Service Unavailable");
    }

    #[tokio::test]
    async fn empty_prompt_is_400() {
        let (status, body, _) = post_infer(app(true), json!({"input": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing prompt/input");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_502() {
        let (status, body, _) = post_infer(app(true), json!({"prompt": "Hi"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "failed");
    }
}
