//! Transport seams.
//!
//! The dispatch layer does not care how bytes reach a peer; it consumes
//! these traits. The TCP implementation lives in [`crate::tcp`], the HTTP
//! fallback in [`crate::http`]; tests substitute mocks.

use async_trait::async_trait;
use serde_json::Value;

use tether_foundation::{DispatchResult, PeerId};

/// Opens logical channels addressed by peer identity.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Open a channel to `peer`. Resolves when the channel is ready for a
    /// request; callers race this against their connect timeout.
    async fn connect(&self, peer: &PeerId) -> DispatchResult<Box<dyn PeerChannel>>;
}

/// One open logical channel to a peer.
///
/// Channels are finite resources: [`close`](PeerChannel::close) consumes
/// the channel and must be called on every exit path. Implementations must
/// additionally release the underlying resource on drop, so that a caller
/// abandoned by a deadline cannot leak it.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Perform one request/response exchange.
    ///
    /// A channel that reports closed, before or instead of a response,
    /// fails with `ChannelClosed`; a malformed response fails with
    /// `Upstream` and must not be treated as channel degradation.
    async fn request(&self, method: &str, payload: &Value) -> DispatchResult<Value>;

    /// Release the channel. Consumes the handle: release happens at most
    /// once by construction.
    async fn close(self: Box<Self>);
}

/// Address-based request/response transport used when the primary channel
/// degrades. The same logical peer, reached by a separately-known network
/// address.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    async fn request(&self, peer: &PeerId, method: &str, payload: &Value)
    -> DispatchResult<Value>;
}

/// Server-side seam: answers one logical method call, regardless of which
/// transport delivered it. Implementations must not panic on malformed
/// payloads; every answer is a JSON value, failures included.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, method: &str, payload: Value) -> Value;
}
