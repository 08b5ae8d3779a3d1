//! Gemini `generateContent` wire format (single, non-streaming response).

use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, ProviderConfig};

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Build the upstream request. The key travels as the `key` query parameter.
pub fn build_request(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    credential: &ApiKey,
    text: &str,
) -> reqwest::RequestBuilder {
    let url = format!(
        "{}/models/{}:generateContent",
        provider.url.trim_end_matches('/'),
        provider.model
    );
    let body = GenerateContentRequest {
        contents: [Content {
            parts: [Part { text }],
        }],
    };

    client
        .post(url)
        .query(&[("key", credential.expose_secret())])
        .header(header::CONTENT_TYPE, "application/json")
        .json(&body)
}

/// Extract `candidates[0].content.parts[0].text` from a full response body.
pub fn response_text(body: &[u8]) -> Result<Option<String>, serde_json::Error> {
    let response: GenerateContentResponse = serde_json::from_slice(body)?;
    Ok(response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text))
}
