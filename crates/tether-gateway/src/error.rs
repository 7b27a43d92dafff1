//! Gateway error types and envelope → HTTP status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tether_foundation::ResponseEnvelope;

/// Seconds suggested to clients in `Retry-After` on 503 responses.
pub const RETRY_AFTER_SECS: &str = "5";

/// Handler-level gateway errors (before a dispatch produces an envelope).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("orchestrator public key not configured")]
    UpstreamNotConfigured,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::UpstreamNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Service Unavailable",
                    "details": "Orchestrator public key not configured",
                })),
            )
                .into_response(),
        }
    }
}

/// HTTP status for a dispatch envelope, keyed on the stable error tag.
pub fn status_for(envelope: &ResponseEnvelope) -> StatusCode {
    if !envelope.is_failed() {
        return StatusCode::OK;
    }
    match envelope.error.as_deref() {
        Some("Missing prompt/input") | Some("Invalid registration") => StatusCode::BAD_REQUEST,
        Some("No workers available")
        | Some("Upstream circuit open")
        | Some("Upstream timeout")
        | Some("Tenant limit exceeded") => StatusCode::SERVICE_UNAVAILABLE,
        Some("Channel closed") | Some("Connection failed") | Some("Worker invocation failed") => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tether_foundation::DispatchError;

    #[test]
    fn completed_is_200() {
        let envelope = ResponseEnvelope::completed(json!({"output": "x"}));
        assert_eq!(status_for(&envelope), StatusCode::OK);
    }

    #[test]
    fn validation_is_400() {
        let envelope = ResponseEnvelope::failed(&DispatchError::MissingPrompt);
        assert_eq!(status_for(&envelope), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailable_class_is_503() {
        for err in [
            DispatchError::NoWorkersAvailable,
            DispatchError::BreakerOpen,
            DispatchError::CallTimeout(Duration::from_secs(1)),
            DispatchError::LimiterSaturated("t".into()),
        ] {
            let envelope = ResponseEnvelope::failed(&err);
            assert_eq!(status_for(&envelope), StatusCode::SERVICE_UNAVAILABLE, "{err}");
        }
    }

    #[test]
    fn transport_class_is_502() {
        for err in [
            DispatchError::ChannelClosed("eof".into()),
            DispatchError::Connection("refused".into()),
            DispatchError::Upstream("bad response".into()),
        ] {
            let envelope = ResponseEnvelope::failed(&err);
            assert_eq!(status_for(&envelope), StatusCode::BAD_GATEWAY, "{err}");
        }
    }

    #[test]
    fn unknown_tag_is_500() {
        let envelope = ResponseEnvelope {
            status: tether_foundation::ResponseStatus::Failed,
            result: None,
            error: Some("Something novel".to_string()),
            details: None,
        };
        assert_eq!(status_for(&envelope), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
