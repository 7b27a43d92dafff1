//! Dual-transport call path.
//!
//! Availability over latency: prefer the peer-addressed channel, and when
//! that path degrades (channel closed, connect or exchange timeout) fall
//! back to the address-based transport for the same call attempt. Any
//! other failure (malformed response, non-network fault) propagates
//! without fallback.
//!
//! The channel is a finite resource. There is exactly one release point
//! after a channel opens, before any fallback or return; leaking here is a
//! correctness bug, not a performance nit.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use tether_foundation::{DispatchResult, PeerId};

use crate::channel::{FallbackTransport, PeerConnector};
use crate::deadline::with_deadline;

/// Timeouts for one call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Bound on channel-open (handshake) time.
    pub connect_timeout: Duration,
    /// Bound on the request/response exchange.
    pub request_timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5_000),
            request_timeout: Duration::from_millis(15_000),
        }
    }
}

/// Calls a peer over the primary channel with HTTP fallback.
pub struct DualTransportClient {
    connector: Arc<dyn PeerConnector>,
    fallback: Arc<dyn FallbackTransport>,
    options: CallOptions,
}

impl DualTransportClient {
    /// Build a client from the two transports.
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        fallback: Arc<dyn FallbackTransport>,
        options: CallOptions,
    ) -> Self {
        Self {
            connector,
            fallback,
            options,
        }
    }

    /// Perform one logical call to `peer`.
    pub async fn call(&self, peer: &PeerId, method: &str, payload: &Value) -> DispatchResult<Value> {
        let channel =
            match with_deadline(self.options.connect_timeout, self.connector.connect(peer)).await {
                Ok(channel) => channel,
                Err(err) if err.triggers_fallback() => {
                    warn!(peer = %peer.short(), error = %err, "channel open degraded, using fallback");
                    return self.fallback.request(peer, method, payload).await;
                }
                Err(err) => return Err(err),
            };

        let outcome =
            with_deadline(self.options.request_timeout, channel.request(method, payload)).await;

        // Single release point for every post-open path.
        channel.close().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(err) if err.triggers_fallback() => {
                warn!(peer = %peer.short(), error = %err, "channel exchange degraded, using fallback");
                self.fallback.request(peer, method, payload).await
            }
            Err(err) => Err(err),
        }
    }
}
