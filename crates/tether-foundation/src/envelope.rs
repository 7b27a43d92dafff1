//! Canonical request/response envelopes.
//!
//! Inbound payloads arrive in several historical shapes (`prompt` vs
//! `input`, `max_tokens` present or not, optional chat history). They are
//! canonicalized exactly once, at the dispatch boundary, into
//! [`RequestEnvelope`]; everything downstream operates on the canonical
//! form only.
//!
//! [`ResponseEnvelope`] is the uniform shape that crosses every hop
//! boundary; a raw transport error never leaves the dispatch layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};

/// Default token budget when the request does not carry one.
pub const DEFAULT_MAX_TOKENS: u32 = 128;

/// Tenant key used when the request carries no tenant at all.
pub const ANONYMOUS_TENANT: &str = "anonymous";

/// How chat history is folded into the prompt handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// History contents and prompt joined with newlines, no role framing.
    #[default]
    Direct,
    /// `ROLE: content` lines, then `USER: <prompt>` and a trailing
    /// `ASSISTANT:` cue.
    Chat,
}

/// One message of chat history, passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// Canonical inference request.
///
/// `prompt` is guaranteed non-empty: [`canonicalize`](RequestEnvelope::canonicalize)
/// rejects the request before any dispatch work otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ChatMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl RequestEnvelope {
    /// Build the canonical envelope from a heterogeneous inbound payload.
    ///
    /// - `prompt` := `payload.prompt` ?? `payload.input` ?? `""`
    /// - `model`  := `payload.model` when it is a non-empty string
    /// - `max_tokens` := `payload.max_tokens` when numeric, else 128
    ///
    /// Fails with [`DispatchError::MissingPrompt`] when the prompt is empty
    /// after normalization.
    pub fn canonicalize(payload: &Value) -> DispatchResult<Self> {
        let prompt = payload
            .get("prompt")
            .and_then(Value::as_str)
            .or_else(|| payload.get("input").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();
        if prompt.is_empty() {
            return Err(DispatchError::MissingPrompt);
        }

        let model = payload
            .get("model")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from);

        let max_tokens = payload
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let temperature = payload
            .get("temperature")
            .and_then(Value::as_f64)
            .map(|t| t as f32);

        let mode = payload
            .get("mode")
            .and_then(Value::as_str)
            .map(|m| match m.trim().to_ascii_lowercase().as_str() {
                "chat" => ChatMode::Chat,
                _ => ChatMode::Direct,
            });

        let messages = payload
            .get("messages")
            .filter(|m| m.is_array())
            .and_then(|m| serde_json::from_value::<Vec<ChatMessage>>(m.clone()).ok());

        let tenant_id = payload
            .get("tenant_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        Ok(Self {
            model,
            prompt,
            max_tokens,
            temperature,
            mode,
            messages,
            tenant_id,
        })
    }

    /// The tenant key for admission control: explicit `tenant_id`, else the
    /// caller-supplied hint (typically an `x-tenant-id` header), else
    /// [`ANONYMOUS_TENANT`].
    pub fn tenant_key(&self, hint: Option<&str>) -> String {
        self.tenant_id
            .clone()
            .or_else(|| hint.map(str::trim).filter(|h| !h.is_empty()).map(String::from))
            .unwrap_or_else(|| ANONYMOUS_TENANT.to_string())
    }

    /// Fold chat history and the prompt into the single string handed to
    /// the inference capability.
    pub fn chat_prompt(&self) -> String {
        let mode = self.mode.unwrap_or_default();
        match mode {
            ChatMode::Chat => {
                let mut parts: Vec<String> = self
                    .messages
                    .iter()
                    .flatten()
                    .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
                    .collect();
                parts.push(format!("USER: {}", self.prompt));
                parts.push("ASSISTANT:".to_string());
                parts.join("\n")
            }
            ChatMode::Direct => {
                let history = self
                    .messages
                    .iter()
                    .flatten()
                    .map(|m| m.content.clone())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                [history, self.prompt.clone()]
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

/// Terminal status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Failed,
}

/// Uniform response envelope crossing every hop boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ResponseEnvelope {
    /// A completed dispatch with the opaque result payload.
    pub fn completed(result: Value) -> Self {
        Self {
            status: ResponseStatus::Completed,
            result: Some(result),
            error: None,
            details: None,
        }
    }

    /// A failed dispatch: stable taxonomy tag plus human-readable details.
    pub fn failed(err: &DispatchError) -> Self {
        Self {
            status: ResponseStatus::Failed,
            result: None,
            error: Some(err.tag().to_string()),
            details: Some(err.to_string()),
        }
    }

    /// Whether this envelope reports a failure.
    pub fn is_failed(&self) -> bool {
        self.status == ResponseStatus::Failed
    }

    /// Interpret a raw JSON value returned by a transport call.
    ///
    /// The orchestrator hop already answers with an envelope; the worker
    /// hop answers with a bare result object. An object carrying a valid
    /// `status` field passes through unchanged, anything else is wrapped as
    /// a completed result.
    pub fn from_wire(value: Value) -> Self {
        if value.get("status").is_some() {
            if let Ok(envelope) = serde_json::from_value::<ResponseEnvelope>(value.clone()) {
                return envelope;
            }
        }
        Self::completed(value)
    }
}
