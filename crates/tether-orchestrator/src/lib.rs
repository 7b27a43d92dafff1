//! Tether Orchestrator — the scheduling hop.
//!
//! Workers register here (over either transport); inbound `schedule`
//! requests are dispatched onto a selected worker through the resilience
//! pipeline. The same [`RpcService`](tether_dispatch::RpcService) answers
//! on both surfaces:
//! - an NDJSON peer-channel listener, and
//! - an axum HTTP surface (`/health`, `/schedule`, `/register-worker`,
//!   `/workers`), which is also what the gateway's fallback transport
//!   reaches.

pub mod server;

pub use server::{Orchestrator, OrchestratorConfig};
