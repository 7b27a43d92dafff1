//! Address-based HTTP fallback transport.
//!
//! The slower-but-predictable path: `POST {base}/{method}` with the JSON
//! payload as body. Per-peer base URLs are learned at registration time;
//! a default URL covers the fixed-upstream case (gateway → orchestrator).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use tether_foundation::{DispatchError, DispatchResult, PeerId};

use crate::channel::FallbackTransport;

/// HTTP implementation of [`FallbackTransport`].
pub struct HttpFallback {
    client: reqwest::Client,
    addresses: DashMap<PeerId, String>,
    default_url: Option<String>,
}

impl HttpFallback {
    /// Create a fallback transport with a per-request timeout and an
    /// optional default base URL used for peers without a learned address.
    pub fn new(request_timeout: Duration, default_url: Option<String>) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DispatchError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            addresses: DashMap::new(),
            default_url,
        })
    }

    /// Learn (or update) the HTTP base URL for a peer.
    pub fn add_address(&self, peer: PeerId, base_url: impl Into<String>) {
        self.addresses.insert(peer, base_url.into());
    }

    fn base_url_for(&self, peer: &PeerId) -> DispatchResult<String> {
        self.addresses
            .get(peer)
            .map(|a| a.clone())
            .or_else(|| self.default_url.clone())
            .ok_or_else(|| {
                DispatchError::Connection(format!(
                    "no fallback address for peer {}",
                    peer.short()
                ))
            })
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    async fn request(
        &self,
        peer: &PeerId,
        method: &str,
        payload: &Value,
    ) -> DispatchResult<Value> {
        let base = self.base_url_for(peer)?;
        let url = format!("{}/{}", base.trim_end_matches('/'), method);
        debug!(peer = %peer.short(), url = %url, "fallback transport request");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DispatchError::Upstream(format!(
                "fallback answered {status}"
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| DispatchError::Upstream(format!("malformed fallback response: {e}")))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::CallTimeout(Duration::ZERO)
    } else if err.is_connect() {
        DispatchError::Connection(err.to_string())
    } else {
        DispatchError::Upstream(err.to_string())
    }
}
