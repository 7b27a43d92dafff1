//! Tether Orchestrator — entry point.
//!
//! Reads configuration from environment variables and starts the HTTP
//! surface plus the peer-channel listener.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ORCHESTRATOR_PORT` | `4000` | HTTP port. |
//! | `ORCHESTRATOR_CHANNEL_ADDR` | `0.0.0.0:4001` | Peer-channel bind address. |
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

use tether_foundation::breaker::BreakerConfig;
use tether_foundation::{LimiterConfig, RetryPolicy};
use tether_orchestrator::{Orchestrator, OrchestratorConfig};
use tether_transport::CallOptions;
use tracing::info;
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

    let config = OrchestratorConfig {
        http_port: env_or("ORCHESTRATOR_PORT", 4000),
        channel_addr: std::env::var("ORCHESTRATOR_CHANNEL_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:4001".to_string()),
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

    info!(port = config.http_port, channel = %config.channel_addr, "orchestrator configuration loaded");

    let orchestrator = match Orchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Orchestrator setup error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = orchestrator.start().await {
        eprintln!("Orchestrator error: {e}");
        std::process::exit(1);
    }
}
