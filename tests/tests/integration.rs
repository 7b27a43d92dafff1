//! End-to-end dispatch flows: worker registration, scheduling over the
//! peer channel, fallback to HTTP, breaker behavior, and the full
//! gateway → orchestrator → worker chain.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

use tether_dispatch::rpc::{METHOD_REGISTER_WORKER, METHOD_SCHEDULE};
use tether_foundation::RetryPolicy;
use tether_foundation::breaker::BreakerConfig;
use tether_gateway::{GatewayServer, GatewayServerConfig};
use tether_orchestrator::Orchestrator;
use tether_testing::{
    fresh_peer, spawn_worker_channel, spawn_worker_http, test_orchestrator_config,
};
use tether_transport::{CallOptions, serve_channel};

fn registration(peer: &tether_foundation::PeerId, model: &str) -> Value {
    json!({ "identity": peer.to_hex(), "model": model })
}

#[tokio::test]
async fn schedule_without_workers_fails_terminally() {
    let orchestrator = Orchestrator::new(test_orchestrator_config()).unwrap();
    let response = orchestrator
        .rpc()
        .handle(METHOD_SCHEDULE, json!({"input": "Hi"}))
        .await;
    assert_eq!(response["status"], "failed");
    assert_eq!(response["error"], "No workers available");
}

#[tokio::test]
async fn schedule_reaches_worker_over_peer_channel() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(test_orchestrator_config())?;
    let rpc = orchestrator.rpc();

    let (peer, channel_addr) = spawn_worker_channel("demo").await;
    let mut reg = registration(&peer, "demo");
    reg["channel_addr"] = json!(channel_addr);
    let ack = rpc.handle(METHOD_REGISTER_WORKER, reg).await;
    assert_eq!(ack["status"], "ok");

    let response = rpc
        .handle(METHOD_SCHEDULE, json!({"prompt": "Hi", "model": "demo"}))
        .await;
    assert_eq!(response["status"], "completed");
    assert_eq!(response["result"]["output"], "Hi");
    assert_eq!(response["result"]["provider"], "echo");
    Ok(())
}

#[tokio::test]
async fn degraded_channel_falls_back_to_http() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(test_orchestrator_config())?;
    let rpc = orchestrator.rpc();

    // Channel route points at a closed port; only the HTTP path works.
    let http_addr = spawn_worker_http("demo").await;
    let peer = fresh_peer();
    let mut reg = registration(&peer, "demo");
    reg["channel_addr"] = json!("127.0.0.1:1");
    reg["http_addr"] = json!(http_addr);
    rpc.handle(METHOD_REGISTER_WORKER, reg).await;

    let response = rpc
        .handle(METHOD_SCHEDULE, json!({"input": "Hi there"}))
        .await;
    assert_eq!(response["status"], "completed");
    assert_eq!(response["result"]["output"], "Hi there");
    Ok(())
}

#[tokio::test]
async fn chat_mode_framing_survives_the_full_hop() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(test_orchestrator_config())?;
    let rpc = orchestrator.rpc();

    let (peer, channel_addr) = spawn_worker_channel("demo").await;
    let mut reg = registration(&peer, "demo");
    reg["channel_addr"] = json!(channel_addr);
    rpc.handle(METHOD_REGISTER_WORKER, reg).await;

    let response = rpc
        .handle(
            METHOD_SCHEDULE,
            json!({
                "prompt": "How are you?",
                "model": "demo",
                "mode": "chat",
                "messages": [{"role": "user", "content": "Hello"}],
            }),
        )
        .await;
    assert_eq!(
        response["result"]["output"],
        "USER: Hello\nUSER: How are you?\nASSISTANT:"
    );
    Ok(())
}

#[tokio::test]
async fn repeated_failures_trip_the_worker_breaker() -> anyhow::Result<()> {
    let mut config = test_orchestrator_config();
    config.retry = RetryPolicy::no_retry();
    config.breaker = BreakerConfig::default()
        .with_error_threshold(50)
        .with_call_timeout(Duration::from_millis(800))
        .with_reset_timeout(Duration::from_secs(60));
    config.call = CallOptions {
        connect_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(200),
    };
    let orchestrator = Orchestrator::new(config)?;
    let rpc = orchestrator.rpc();

    // Both paths dead: every attempt is a connection failure.
    let peer = fresh_peer();
    let mut reg = registration(&peer, "demo");
    reg["channel_addr"] = json!("127.0.0.1:1");
    reg["http_addr"] = json!("http://127.0.0.1:1");
    rpc.handle(METHOD_REGISTER_WORKER, reg).await;

    let first = rpc.handle(METHOD_SCHEDULE, json!({"input": "Hi"})).await;
    assert_eq!(first["status"], "failed");
    assert_eq!(first["error"], "Connection failed");

    // The breaker for that worker is now open: fast-fail, no attempt.
    let second = rpc.handle(METHOD_SCHEDULE, json!({"input": "Hi"})).await;
    assert_eq!(second["status"], "failed");
    assert_eq!(second["error"], "Upstream circuit open");
    Ok(())
}

async fn gateway_app_for(
    orchestrator: &Orchestrator,
) -> anyhow::Result<axum::Router> {
    let rpc = orchestrator.rpc();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let channel_addr = listener.local_addr()?.to_string();
    tokio::spawn(serve_channel(listener, rpc));

    let app = GatewayServer::new(GatewayServerConfig {
        orchestrator_key: Some(fresh_peer()),
        orchestrator_channel_addr: Some(channel_addr),
        orchestrator_http_url: "http://127.0.0.1:1".to_string(),
        request_deadline: Duration::from_secs(5),
        retry: RetryPolicy::no_retry(),
        call: CallOptions {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
        },
        ..Default::default()
    })
    .build_app()?;
    Ok(app)
}

async fn response_parts(response: axum::response::Response) -> (StatusCode, Value, Option<String>) {
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
async fn full_chain_gateway_to_worker() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(test_orchestrator_config())?;
    let (peer, worker_addr) = spawn_worker_channel("demo").await;
    let mut reg = registration(&peer, "demo");
    reg["channel_addr"] = json!(worker_addr);
    orchestrator.rpc().handle(METHOD_REGISTER_WORKER, reg).await;

    let app = gateway_app_for(&orchestrator).await?;
    let response = app
        .oneshot(
            Request::post("/infer")
                .header("content-type", "application/json")
                .header("x-tenant-id", "acme")
                .body(Body::from(
                    json!({"prompt": "Hi", "model": "demo"}).to_string(),
                ))?,
        )
        .await?;

    let (status, body, _) = response_parts(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"]["output"], "Hi");
    Ok(())
}

#[tokio::test]
async fn full_chain_no_workers_maps_to_503_with_retry_after() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(test_orchestrator_config())?;
    let app = gateway_app_for(&orchestrator).await?;

    let response = app
        .oneshot(
            Request::post("/infer")
                .header("content-type", "application/json")
                .body(Body::from(json!({"input": "Hi"}).to_string()))?,
        )
        .await?;

    let (status, body, retry_after) = response_parts(response).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "No workers available");
    assert_eq!(retry_after.as_deref(), Some("5"));
    Ok(())
}
