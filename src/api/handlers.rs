//! HTTP request handlers.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use super::server::AppState;
use crate::error::Error;
use crate::provider::ChatRequest;
use crate::relay::events::resolve_provider;

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    /// Provider selector; the configured default when absent
    #[serde(default)]
    pub model: Option<String>,
}

/// Handle POST /api/chat
///
/// Drains the same fragment stream a socket client would receive and
/// returns it as one string.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<serde_json::Value>, Error> {
    let controller = &state.controller;
    let provider = resolve_provider(body.model.as_deref(), controller.default_provider())?;
    let request = ChatRequest::new(body.message, provider, controller.max_message_chars())?;

    tracing::info!(provider = %provider, "Received chat request");

    let started = std::time::Instant::now();
    let response = controller.adapter().complete(&request).await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Chat request failed");
        e
    })?;

    tracing::info!(
        provider = %provider,
        chars = response.chars().count(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Chat request complete"
    );

    Ok(Json(serde_json::json!({ "response": response })))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatrelay",
        "active_sessions": state.controller.sessions().active_count(),
    }))
}

/// Handle GET /providers
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers: Vec<serde_json::Value> = state
        .controller
        .adapter()
        .providers()
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name(),
                "model": p.model,
                "streaming": p.streaming(),
                "enabled": p.enabled,
                "credential_configured": p.key_source() != crate::config::KeySource::None,
            })
        })
        .collect();

    Json(serde_json::json!({
        "default": state.config.server.default_provider,
        "providers": providers
    }))
}
