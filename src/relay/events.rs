//! Event frames exchanged with chat clients.
//!
//! Frames are JSON envelopes `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{ChatRequest, ProviderKind};

/// Events sent to the client during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// One fragment of model output.
    AiMessageChunk(String),
    /// The turn finished successfully. Serialized without a `data` field.
    AiMessageDone,
    /// The turn (or the request that would have started it) failed.
    AiMessageError(String),
}

impl OutboundEvent {
    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboundEvent::AiMessageChunk(_))
    }
}

/// Events accepted from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    UserMessage(UserMessage),
}

/// Payload of `user_message`: older clients send a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserMessage {
    Text(String),
    Structured {
        text: String,
        #[serde(default)]
        model: Option<String>,
    },
}

impl UserMessage {
    /// Validate into a [`ChatRequest`], falling back to `default_provider`
    /// when no model is named.
    pub fn into_request(
        self,
        default_provider: ProviderKind,
        max_chars: usize,
    ) -> Result<ChatRequest> {
        let (text, model) = match self {
            UserMessage::Text(text) => (text, None),
            UserMessage::Structured { text, model } => (text, model),
        };
        let provider = resolve_provider(model.as_deref(), default_provider)?;
        ChatRequest::new(text, provider, max_chars)
    }
}

/// Map an optional client-supplied selector to a provider.
pub fn resolve_provider(model: Option<&str>, default_provider: ProviderKind) -> Result<ProviderKind> {
    match model.map(str::trim) {
        None | Some("") => Ok(default_provider),
        Some(name) => name.parse(),
    }
}

/// Parse one inbound text frame.
///
/// A well-formed `user_message` envelope yields its payload. Text that is not
/// a JSON object is a legacy bare-string message: a JSON string literal is
/// unquoted, anything else is taken verbatim.
pub fn parse_frame(raw: &str) -> Result<UserMessage> {
    if let Ok(InboundEvent::UserMessage(message)) = serde_json::from_str::<InboundEvent>(raw) {
        return Ok(message);
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(obj)) => {
            let event = obj
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("<missing>");
            Err(Error::BadRequest(format!(
                "Unsupported or malformed event '{}'",
                event
            )))
        }
        Ok(serde_json::Value::String(text)) => Ok(UserMessage::Text(text)),
        _ => Ok(UserMessage::Text(raw.to_string())),
    }
}
