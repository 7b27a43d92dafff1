//! Tether Dispatch — the top-level orchestration of one inference request.
//!
//! [`Dispatcher`] canonicalizes an inbound payload, resolves a call target,
//! and executes the call through the resilience pipeline:
//!
//! ```text
//! limiter.schedule(tenant, retry.run(|| breaker.fire(client.call(peer, method, ..))))
//! ```
//!
//! The same pipeline serves both hops: the gateway dispatches to a fixed
//! upstream orchestrator, the orchestrator dispatches to a worker selected
//! from its registry. They differ only in the [`TargetResolver`].
//!
//! [`rpc::RpcService`] is the matching server side: the transport-agnostic
//! method surface (`health`, `register-worker`, `schedule`/`infer`) served
//! identically over the peer channel and the HTTP boundary.

pub mod capability;
pub mod discovery;
pub mod dispatcher;
pub mod rpc;

pub use capability::{InferenceCapability, WorkerService};
pub use discovery::{discover_orchestrator_key, resolve_orchestrator_key};
pub use dispatcher::{CallTarget, Dispatcher, FixedUpstream, TargetResolver, WorkerPool};
pub use rpc::{RegisterWorkerRequest, RpcService};
