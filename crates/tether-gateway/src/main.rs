//! Tether Gateway — entry point.
//!
//! Reads configuration from environment variables, discovers the upstream
//! orchestrator identity, and starts the axum-based HTTP gateway.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_PORT` | `8080` | TCP port to listen on. |
//! | `ORCHESTRATOR_PUBLIC_KEY` | *(none)* | Upstream peer key as hex. |
//! | `ORCHESTRATOR_KEY_FILE` | *(none)* | File containing the key as hex. |
//! | `ORCHESTRATOR_CHANNEL_ADDR` | *(none)* | Upstream peer-channel address. |
//! | `ORCHESTRATOR_HTTP_URL` | `http://tether-orchestrator:4000` | Fallback base URL. |
//! | `REQUEST_DEADLINE_MS` | `30000` | Overall per-request deadline. |
//! | `TENANT_RATE_LIMIT_RPS` | `5` | Reservoir size per tenant per refill. |
//! | `TENANT_REFILL_INTERVAL_MS` | `1000` | Reservoir refill interval. |
//! | `TENANT_MAX_CONCURRENT` | `2` | In-flight ceiling per tenant. |
//! | `BREAKER_TIMEOUT_MS` | `15000` | Per-call timeout. |
//! | `BREAKER_ERROR_THRESHOLD` | `80` | Failure % that opens the circuit. |
//! | `BREAKER_RESET_TIMEOUT_MS` | `30000` | Open-state reset timeout. |
//! | `BREAKER_WINDOW_CALLS` | `10` | Evaluation window, in calls. |
//! | `BREAKER_MIN_CALLS` | `0` | Minimum volume before evaluation. |
//! | `RETRY_ATTEMPTS` | `2` | Retries after the first attempt. |
//! | `RETRY_MIN_MS` | `200` | Base backoff delay. |
//! | `RETRY_MAX_MS` | `1500` | Backoff cap, jitter included. |
//! | `CONNECT_TIMEOUT_MS` | `5000` | Channel-open timeout. |
//! | `REQUEST_TIMEOUT_MS` | `15000` | Exchange timeout. |

use std::str::FromStr;
use std::time::Duration;

use tether_dispatch::discover_orchestrator_key;
use tether_foundation::breaker::BreakerConfig;
use tether_foundation::{LimiterConfig, RetryPolicy};
use tether_gateway::{GatewayServer, GatewayServerConfig};
use tether_transport::CallOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let orchestrator_key = match discover_orchestrator_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Gateway setup error: {e}");
            std::process::exit(1);
        }
    };
    if orchestrator_key.is_none() {
        warn!("orchestrator public key not set; gateway cannot forward requests");
    }

    let config = GatewayServerConfig {
        port: env_or("GATEWAY_PORT", 8080),
        orchestrator_key,
        orchestrator_channel_addr: std::env::var("ORCHESTRATOR_CHANNEL_ADDR").ok(),
        orchestrator_http_url: std::env::var("ORCHESTRATOR_HTTP_URL")
            .unwrap_or_else(|_| "http://tether-orchestrator:4000".to_string()),
        request_deadline: Duration::from_millis(env_or("REQUEST_DEADLINE_MS", 30_000)),
        limiter: LimiterConfig {
            reservoir: env_or("TENANT_RATE_LIMIT_RPS", 5),
            refill_interval: Duration::from_millis(env_or("TENANT_REFILL_INTERVAL_MS", 1000)),
            refill_amount: env_or("TENANT_RATE_LIMIT_RPS", 5),
            max_concurrent: env_or("TENANT_MAX_CONCURRENT", 2),
        },
        breaker: BreakerConfig {
            call_timeout: Duration::from_millis(env_or("BREAKER_TIMEOUT_MS", 15_000)),
            error_threshold: env_or("BREAKER_ERROR_THRESHOLD", 80),
            reset_timeout: Duration::from_millis(env_or("BREAKER_RESET_TIMEOUT_MS", 30_000)),
            window: env_or("BREAKER_WINDOW_CALLS", 10),
            min_calls: env_or("BREAKER_MIN_CALLS", 0),
        },
        retry: RetryPolicy {
            retries: env_or("RETRY_ATTEMPTS", 2),
            min_delay: Duration::from_millis(env_or("RETRY_MIN_MS", 200)),
            max_delay: Duration::from_millis(env_or("RETRY_MAX_MS", 1500)),
            factor: 2.0,
            randomize: true,
        },
        call: CallOptions {
            connect_timeout: Duration::from_millis(env_or("CONNECT_TIMEOUT_MS", 5_000)),
            request_timeout: Duration::from_millis(env_or("REQUEST_TIMEOUT_MS", 15_000)),
        },
    };

    info!(
        port = config.port,
        upstream_key_present = config.orchestrator_key.is_some(),
        fallback_url = %config.orchestrator_http_url,
        "gateway configuration loaded"
    );

    if let Err(e) = GatewayServer::new(config).start().await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}
