//! Tether Foundation — building blocks of the resilient dispatch layer.
//!
//! This crate holds everything that is shared between the gateway and the
//! orchestrator hop of a dispatch:
//! - Peer identities ([`PeerId`]) and the worker registry
//! - Canonical request/response envelopes and payload canonicalization
//! - Per-tenant admission control ([`TenantLimiter`])
//! - Per-destination circuit breaking ([`breaker::CircuitBreaker`])
//! - Bounded retry with exponential backoff and jitter ([`RetryExecutor`])
//!
//! The pieces compose into one pipeline, applied identically at both hops
//! (gateway → orchestrator and orchestrator → worker):
//!
//! ```text
//! limiter.schedule(tenant, retry.run(|| breaker.fire(transport.call(..))))
//! ```

pub mod breaker;
pub mod envelope;
pub mod error;
pub mod limiter;
pub mod peer;
pub mod registry;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker};
pub use envelope::{ChatMessage, ChatMode, RequestEnvelope, ResponseEnvelope, ResponseStatus};
pub use error::{DispatchError, DispatchResult};
pub use limiter::{LimiterConfig, TenantLimiter};
pub use peer::PeerId;
pub use registry::{WorkerRecord, WorkerRegistry};
pub use retry::{RetryExecutor, RetryPolicy};
