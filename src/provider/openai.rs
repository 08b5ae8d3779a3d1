//! OpenAI-compatible chat completions wire format (groq, openai).

use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, ProviderConfig};

/// Streaming chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: [Message<'a>; 2],
}

/// A chat message.
#[derive(Debug, Clone, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> ChatCompletionRequest<'a> {
    /// System persona followed by the single user message.
    pub fn new(model: &'a str, persona: &'a str, text: &'a str) -> Self {
        Self {
            model,
            stream: true,
            messages: [
                Message {
                    role: "system",
                    content: persona,
                },
                Message {
                    role: "user",
                    content: text,
                },
            ],
        }
    }
}

/// Streaming chunk; only the fields the relay reads.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract `choices[0].delta.content` from one SSE data payload.
///
/// Returns `Ok(None)` for well-formed chunks without text (role announcements,
/// usage-only chunks, empty deltas).
pub fn delta_content(data: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|c| !c.is_empty()))
}

/// Build the upstream request for an OpenAI-compatible provider.
pub fn build_request(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    credential: &ApiKey,
    persona: &str,
    text: &str,
) -> reqwest::RequestBuilder {
    let url = format!("{}/chat/completions", provider.url.trim_end_matches('/'));
    let body = ChatCompletionRequest::new(&provider.model, persona, text);

    client
        .post(url)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", credential.expose_secret()),
        )
        .json(&body)
}
