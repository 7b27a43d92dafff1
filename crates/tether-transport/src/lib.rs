//! Tether Transport — how a dispatch reaches a peer.
//!
//! Two paths to every peer:
//! - **Primary**: a logical channel addressed by the peer's public key
//!   ([`PeerConnector`] / [`PeerChannel`]). Low latency, but handshake
//!   completion can be inconsistent under load.
//! - **Fallback**: a plain address-based request/response transport
//!   ([`FallbackTransport`], implemented over HTTP by [`HttpFallback`]).
//!   Slower but predictable.
//!
//! [`DualTransportClient`] implements the selection state machine: try the
//! primary, race it against timeouts, fall back on channel-level
//! degradation only, and release the channel on every exit path.

pub mod channel;
pub mod client;
pub mod deadline;
pub mod http;
pub mod tcp;

pub use channel::{ChannelHandler, FallbackTransport, PeerChannel, PeerConnector};
pub use client::{CallOptions, DualTransportClient};
pub use deadline::with_deadline;
pub use http::HttpFallback;
pub use tcp::{TcpPeerConnector, serve_channel};
