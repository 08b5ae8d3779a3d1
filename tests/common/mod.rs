//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;

use chatrelay::config::{ApiKey, Config};
use chatrelay::provider::ProviderAdapter;
use chatrelay::relay::{OutboundEvent, RelayController};

/// Credential configured for every provider pointed at the mock server.
pub const TEST_KEY: &str = "test-key";

/// Config with every provider pointed at `base_url` and a literal test key.
///
/// groq/openai post to `{base_url}/v1/chat/completions`; gemini posts to
/// `{base_url}/v1beta/models/gemini-1.5-flash:generateContent`.
pub fn mock_config(base_url: &str) -> Config {
    let mut config = Config::default();
    for provider in &mut config.providers {
        provider.url = if provider.streaming() {
            format!("{}/v1", base_url)
        } else {
            format!("{}/v1beta", base_url)
        };
        provider.api_key = Some(ApiKey::from(TEST_KEY));
    }
    config.upstream.response_timeout_secs = 5;
    config.upstream.idle_timeout_secs = 5;
    config
}

pub fn controller(config: &Config) -> RelayController {
    let adapter = ProviderAdapter::with_client(reqwest::Client::new(), config);
    RelayController::new(adapter, &config.server)
}

/// OpenAI-compatible SSE body with one delta per fragment, then `[DONE]`.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::from(
        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    );
    for fragment in fragments {
        body.push_str(&sse_line(fragment));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_line(fragment: &str) -> String {
    format!(
        "data: {{\"id\":\"c1\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}},\"finish_reason\":null}}]}}\n\n",
        serde_json::to_string(fragment).unwrap()
    )
}

pub fn user_message(text: &str, model: &str) -> String {
    serde_json::json!({
        "event": "user_message",
        "data": { "text": text, "model": model }
    })
    .to_string()
}

/// Receive events up to and including the next terminal event.
pub async fn collect_turn(rx: &mut mpsc::UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("event channel closed");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

pub fn chunk(text: &str) -> OutboundEvent {
    OutboundEvent::AiMessageChunk(text.to_string())
}
