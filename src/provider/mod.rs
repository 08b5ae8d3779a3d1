//! Provider adapter.
//!
//! Turns a [`ChatRequest`] into one upstream HTTP call and exposes the
//! model's output as a lazy [`FragmentStream`], whether the provider streams
//! SSE deltas (groq, openai) or answers with a single JSON payload (gemini).

mod gemini;
mod kind;
mod openai;
pub mod sse;

pub use kind::ProviderKind;
pub use sse::{SseDecoder, SseEvent};

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::config::{Config, ProviderConfig};
use crate::error::{Error, Result};

/// One unit of model output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment(String);

impl Fragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Fragment {
    fn from(s: String) -> Self {
        Fragment(s)
    }
}

impl From<&str> for Fragment {
    fn from(s: &str) -> Self {
        Fragment(s.to_string())
    }
}

/// Finite, single-use sequence of fragments from one upstream request.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// A validated chat turn: the user's text and the provider to send it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    text: String,
    provider: ProviderKind,
}

impl ChatRequest {
    /// Validate and build a request.
    ///
    /// The text must contain something other than whitespace and be at most
    /// `max_chars` characters long.
    pub fn new(text: impl Into<String>, provider: ProviderKind, max_chars: usize) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::BadRequest("Message text is empty".to_string()));
        }
        let len = text.chars().count();
        if len > max_chars {
            return Err(Error::BadRequest(format!(
                "Message is {} characters long (limit {})",
                len, max_chars
            )));
        }
        Ok(Self { text, provider })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }
}

/// Builds upstream requests and normalizes their responses into fragments.
///
/// Cheap to clone; the provider table is shared read-only.
#[derive(Clone)]
pub struct ProviderAdapter {
    client: reqwest::Client,
    providers: Arc<[ProviderConfig]>,
    persona: Arc<str>,
    response_timeout: Duration,
    idle_timeout: Duration,
}

impl ProviderAdapter {
    /// Create an adapter with its own HTTP client.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.upstream.connect_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create an adapter around an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            providers: config.providers.clone().into(),
            persona: config.server.system_prompt.as_str().into(),
            response_timeout: config.upstream.response_timeout(),
            idle_timeout: config.upstream.idle_timeout(),
        }
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Start one upstream request for `request`.
    ///
    /// Provider lookup and credential resolution happen immediately, so
    /// configuration errors surface before any network traffic. The HTTP
    /// call itself is issued when the returned stream is first polled.
    pub fn dispatch(&self, request: &ChatRequest) -> Result<FragmentStream> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.kind == request.provider() && p.enabled)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(request.provider().to_string()))?;

        let credential = provider.resolve_credential()?;

        let builder = match provider.kind {
            ProviderKind::Groq | ProviderKind::OpenAi => openai::build_request(
                &self.client,
                &provider,
                &credential,
                &self.persona,
                request.text(),
            ),
            ProviderKind::Gemini => {
                gemini::build_request(&self.client, &provider, &credential, request.text())
            }
        };

        tracing::info!(
            provider = %provider.kind,
            model = %provider.model,
            streaming = provider.streaming(),
            "Dispatching to provider"
        );

        Ok(Box::pin(upstream_fragments(
            builder,
            provider,
            self.response_timeout,
            self.idle_timeout,
        )))
    }

    /// Drain a dispatch into one string, for callers that do not stream.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let mut stream = self.dispatch(request)?;
        let mut out = String::new();
        while let Some(fragment) = stream.next().await {
            out.push_str(fragment?.as_str());
        }
        Ok(out)
    }
}

/// Issue the request and normalize the response into fragments.
fn upstream_fragments(
    builder: reqwest::RequestBuilder,
    provider: ProviderConfig,
    response_timeout: Duration,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Fragment>> + Send {
    async_stream::try_stream! {
        let response = send(builder, &provider, response_timeout).await?;

        if provider.streaming() {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut count = 0usize;

            loop {
                let next = tokio::time::timeout(idle_timeout, body.next())
                    .await
                    .map_err(|_| timeout_error(&provider, idle_timeout))?;
                let chunk = match next {
                    Some(chunk) => chunk.map_err(Error::from)?,
                    None => break,
                };

                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Fragment(text) => {
                            count += 1;
                            yield Fragment::from(text);
                        }
                        SseEvent::Done => {
                            tracing::debug!(provider = %provider.kind, fragments = count, "Upstream sent [DONE]");
                            return;
                        }
                    }
                }
            }

            for event in decoder.finish() {
                if let SseEvent::Fragment(text) = event {
                    count += 1;
                    yield Fragment::from(text);
                }
            }
            tracing::debug!(provider = %provider.kind, fragments = count, "Upstream body ended");
        } else {
            let body = tokio::time::timeout(idle_timeout, response.bytes())
                .await
                .map_err(|_| timeout_error(&provider, idle_timeout))?
                .map_err(Error::from)?;

            let text = gemini::response_text(&body).map_err(|e| {
                tracing::error!(provider = %provider.kind, error = %e, "Failed to parse provider response");
                Error::UpstreamParse {
                    provider: provider.name().to_string(),
                    message: e.to_string(),
                }
            })?;

            match text {
                Some(text) => {
                    yield Fragment::from(text);
                }
                None => {
                    tracing::warn!(provider = %provider.kind, "Provider response had no text");
                }
            }
        }
    }
}

/// Send the request and reject non-2xx responses with their full body.
async fn send(
    builder: reqwest::RequestBuilder,
    provider: &ProviderConfig,
    response_timeout: Duration,
) -> Result<reqwest::Response> {
    let response = tokio::time::timeout(response_timeout, builder.send())
        .await
        .map_err(|_| timeout_error(provider, response_timeout))?
        .map_err(|e| {
            let e = Error::from(e);
            tracing::error!(error = %e, provider = %provider.kind, "Failed to reach provider");
            e
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = %status,
            provider = %provider.kind,
            body = %body,
            "Provider returned error"
        );
        return Err(Error::UpstreamHttp {
            provider: provider.name().to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

fn timeout_error(provider: &ProviderConfig, after: Duration) -> Error {
    tracing::warn!(provider = %provider.kind, after_secs = after.as_secs(), "Provider timed out");
    Error::UpstreamTimeout {
        provider: provider.name().to_string(),
        after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;

    #[test]
    fn chat_request_rejects_blank_text() {
        let err = ChatRequest::new("   \n", ProviderKind::Groq, 500).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn chat_request_counts_chars_not_bytes() {
        let text = "é".repeat(500);
        assert!(ChatRequest::new(text.clone(), ProviderKind::Groq, 500).is_ok());

        let err = ChatRequest::new(format!("{}x", text), ProviderKind::Groq, 500).unwrap_err();
        assert!(err.to_string().contains("501"));
    }

    #[test]
    fn dispatch_disabled_provider_is_unknown() {
        let mut config = Config::default();
        config.providers[2].enabled = false;
        let adapter = ProviderAdapter::with_client(reqwest::Client::new(), &config);

        let request = ChatRequest::new("hi", ProviderKind::Gemini, 500).unwrap();
        let err = adapter.dispatch(&request).err().unwrap();
        assert!(matches!(err, Error::UnknownProvider(ref p) if p == "gemini"));
    }

    #[test]
    fn dispatch_checks_credential_before_network() {
        let mut config = Config::default();
        for provider in &mut config.providers {
            provider.url = "http://127.0.0.1:1".to_string();
            provider.credential_env = "CHATRELAY_TEST_UNSET_CREDENTIAL".to_string();
        }
        let adapter = ProviderAdapter::with_client(reqwest::Client::new(), &config);

        let request = ChatRequest::new("hi", ProviderKind::OpenAi, 500).unwrap();
        let err = adapter.dispatch(&request).err().unwrap();
        assert!(matches!(err, Error::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn transport_error_does_not_carry_query_key() {
        let mut config = Config::default();
        for provider in &mut config.providers {
            provider.url = "http://127.0.0.1:1/v1beta".to_string();
            provider.api_key = Some(ApiKey::from("AIza-SUPER-SECRET"));
        }
        let adapter = ProviderAdapter::with_client(reqwest::Client::new(), &config);

        let request = ChatRequest::new("hi", ProviderKind::Gemini, 500).unwrap();
        let err = adapter.complete(&request).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)), "{:?}", err);
        assert!(!err.to_string().contains("AIza-SUPER-SECRET"), "{}", err);
        assert!(!format!("{:?}", err).contains("AIza-SUPER-SECRET"));
    }
}
