//! Orchestrator wiring and HTTP surface.

use axum::{Json, Router, extract::State, routing::get, routing::post};
use serde_json::Value;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use tether_dispatch::rpc::{METHOD_HEALTH, METHOD_REGISTER_WORKER, METHOD_SCHEDULE};
use tether_dispatch::{Dispatcher, RpcService, WorkerPool};
use tether_foundation::breaker::{BreakerConfig, BreakerRegistry};
use tether_foundation::{
    DispatchResult, LimiterConfig, RetryExecutor, RetryPolicy, TenantLimiter, WorkerRegistry,
};
use tether_transport::{
    CallOptions, DualTransportClient, HttpFallback, TcpPeerConnector, serve_channel,
};

/// Runtime configuration for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// TCP port of the HTTP surface (default: 4000).
    pub http_port: u16,
    /// Bind address of the peer-channel listener (default: `0.0.0.0:4001`).
    pub channel_addr: String,
    pub limiter: LimiterConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub call: CallOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            http_port: 4000,
            channel_addr: "0.0.0.0:4001".to_string(),
            limiter: LimiterConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            call: CallOptions::default(),
        }
    }
}

/// The assembled orchestrator: registry, dispatcher, and the shared RPC
/// service answering on both transports.
pub struct Orchestrator {
    config: OrchestratorConfig,
    rpc: Arc<RpcService>,
}

impl Orchestrator {
    /// Wire registry, transports, and the dispatch pipeline.
    pub fn new(config: OrchestratorConfig) -> DispatchResult<Self> {
        let registry = Arc::new(WorkerRegistry::new());
        let connector = Arc::new(TcpPeerConnector::new());
        let fallback = Arc::new(HttpFallback::new(config.call.request_timeout, None)?);

        let client = Arc::new(DualTransportClient::new(
            Arc::clone(&connector) as Arc<dyn tether_transport::PeerConnector>,
            Arc::clone(&fallback) as Arc<dyn tether_transport::FallbackTransport>,
            config.call.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(WorkerPool::new(Arc::clone(&registry))),
            Arc::new(TenantLimiter::new(config.limiter.clone())),
            Arc::new(BreakerRegistry::new(config.breaker.clone())),
            RetryExecutor::new(config.retry.clone()),
            client,
        ));

        // Registration feeds both transports with the worker's routes.
        let rpc = RpcService::new("orchestrator", Arc::clone(&registry), dispatcher)
            .with_register_hook(move |request| {
                if let Some(addr) = &request.channel_addr {
                    connector.add_route(request.identity, addr.clone());
                }
                if let Some(url) = &request.http_addr {
                    fallback.add_address(request.identity, url.clone());
                }
            });

        Ok(Self {
            config,
            rpc: Arc::new(rpc),
        })
    }

    /// The shared RPC service (also the peer-channel handler).
    pub fn rpc(&self) -> Arc<RpcService> {
        Arc::clone(&self.rpc)
    }

    /// Build the axum router for the HTTP surface.
    ///
    /// `/schedule` always answers `200` with an envelope, failed
    /// envelopes included. Status mapping is the gateway's concern; the
    /// fallback transport needs the envelope body intact.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/schedule", post(schedule_handler))
            .route("/register-worker", post(register_handler))
            .route("/workers", get(workers_handler))
            .with_state(Arc::clone(&self.rpc))
    }

    /// Bind both surfaces and serve until the process exits.
    pub async fn start(self) -> std::io::Result<()> {
        let http_addr = format!("0.0.0.0:{}", self.config.http_port);
        let channel_listener = TcpListener::bind(&self.config.channel_addr).await?;
        let http_listener = TcpListener::bind(&http_addr).await?;
        info!(
            http = %http_addr,
            channel = %self.config.channel_addr,
            "orchestrator starting"
        );

        let rpc = self.rpc();
        let app = self.router();
        tokio::try_join!(
            serve_channel(channel_listener, rpc),
            axum::serve(http_listener, app).into_future(),
        )?;
        Ok(())
    }
}

async fn health_handler(State(rpc): State<Arc<RpcService>>) -> Json<Value> {
    Json(rpc.handle(METHOD_HEALTH, Value::Null).await)
}

async fn schedule_handler(
    State(rpc): State<Arc<RpcService>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    Json(rpc.handle(METHOD_SCHEDULE, payload).await)
}

async fn register_handler(
    State(rpc): State<Arc<RpcService>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    Json(rpc.handle(METHOD_REGISTER_WORKER, payload).await)
}

async fn workers_handler(State(rpc): State<Arc<RpcService>>) -> Json<Value> {
    Json(serde_json::json!({ "workers": rpc.workers() }))
}
