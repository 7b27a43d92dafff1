//! Tether Gateway — the public-facing boundary.
//!
//! Accepts `POST /infer`, dispatches to the upstream orchestrator through
//! the resilience pipeline, and maps envelope outcomes to HTTP statuses:
//!
//! | Outcome | Status |
//! |---------|--------|
//! | completed | `200` |
//! | validation failure | `400` |
//! | no workers / circuit open / timeout / tenant limit | `503` + `Retry-After` |
//! | channel or worker invocation failure | `502` |
//! | anything else | `500` |

pub mod error;
pub mod server;

pub use error::GatewayError;
pub use server::{AppState, GatewayServer, GatewayServerConfig, build_router};
