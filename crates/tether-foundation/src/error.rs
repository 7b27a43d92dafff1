//! Dispatch error taxonomy.
//!
//! Every failure in the dispatch pipeline is one of these variants. The
//! taxonomy drives three separate decisions downstream, so the variants are
//! deliberately coarse:
//! - [`DispatchError::is_transient`] — whether the retry loop may try again
//! - [`DispatchError::triggers_fallback`] — whether the dual-transport
//!   client may switch to the HTTP fallback for the same attempt
//! - [`DispatchError::tag`] — the stable `error` string carried in a failed
//!   [`ResponseEnvelope`](crate::envelope::ResponseEnvelope)

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the dispatch pipeline.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The request had no usable prompt after canonicalization.
    #[error("missing prompt/input in request payload")]
    MissingPrompt,

    /// A worker registration carried an empty model or malformed identity.
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// The registry had no worker to dispatch to.
    #[error("no workers available")]
    NoWorkersAvailable,

    /// A call exceeded its per-call timeout.
    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The peer channel closed before a response arrived (or never opened).
    #[error("peer channel closed: {0}")]
    ChannelClosed(String),

    /// A transport-level connection failure (refused, reset, unreachable).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The circuit breaker for the destination is open; no attempt was made.
    #[error("upstream circuit open")]
    BreakerOpen,

    /// Admission wait exceeded the caller-imposed timeout.
    #[error("admission timed out for tenant '{0}'")]
    LimiterSaturated(String),

    /// The upstream answered, but with something we could not use
    /// (malformed response, non-2xx, protocol violation). Never retried.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// An unexpected internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Whether the retry loop is allowed to attempt this call again.
    ///
    /// Terminal failures (validation, empty registry, upstream protocol
    /// errors) propagate on first occurrence; retrying them cannot help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CallTimeout(_) | Self::ChannelClosed(_) | Self::Connection(_) | Self::BreakerOpen
        )
    }

    /// Whether the dual-transport client should fall back to the
    /// address-based transport for this same attempt.
    ///
    /// Only channel-level degradation qualifies; a malformed response from
    /// a healthy channel propagates as-is.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            Self::CallTimeout(_) | Self::ChannelClosed(_) | Self::Connection(_)
        )
    }

    /// Stable `error` tag carried across hop boundaries.
    ///
    /// The tags are part of the wire contract: the gateway maps them back
    /// to HTTP statuses without parsing the human-readable details.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MissingPrompt => "Missing prompt/input",
            Self::InvalidRegistration(_) => "Invalid registration",
            Self::NoWorkersAvailable => "No workers available",
            Self::CallTimeout(_) => "Upstream timeout",
            Self::ChannelClosed(_) => "Channel closed",
            Self::Connection(_) => "Connection failed",
            Self::BreakerOpen => "Upstream circuit open",
            Self::LimiterSaturated(_) => "Tenant limit exceeded",
            Self::Upstream(_) => "Worker invocation failed",
            Self::Internal(_) => "Internal error",
        }
    }
}

/// Result alias used throughout the dispatch pipeline.
pub type DispatchResult<T> = Result<T, DispatchError>;
