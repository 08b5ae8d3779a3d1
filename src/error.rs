//! Error types for chatrelay.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for chatrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chatrelay.
///
/// Every variant's `Display` output is what a chat client sees in an
/// `ai_message_error` event, so messages are written for humans.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unknown or unsupported provider '{0}'")]
    UnknownProvider(String),

    #[error("Missing {var} for provider '{provider}'")]
    MissingCredential { provider: String, var: String },

    #[error("{provider} API error ({status}): {body}")]
    UpstreamHttp {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {provider}: {message}")]
    UpstreamParse { provider: String, message: String },

    #[error("{provider} did not respond within {}s", .after.as_secs())]
    UpstreamTimeout { provider: String, after: Duration },

    #[error("A response is already streaming on this connection")]
    ConcurrentRequest,

    /// Transport failure. The request URL is stripped on conversion since
    /// gemini carries its key in the query string.
    #[error("Upstream request failed: {0}")]
    Upstream(reqwest::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upstream(e.without_url())
    }
}

impl Error {
    /// HTTP status used when this error is returned from `/api/chat`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UnknownProvider(_) => StatusCode::BAD_REQUEST,
            Error::MissingCredential { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UpstreamHttp { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamParse { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::ConcurrentRequest => StatusCode::CONFLICT,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // OpenAI-compatible error envelope
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": "chatrelay_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_http_message_names_provider_status_and_body() {
        let err = Error::UpstreamHttp {
            provider: "groq".to_string(),
            status: 401,
            body: "{\"error\":\"invalid api key\"}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("groq"));
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid api key"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = Error::UpstreamTimeout {
            provider: "openai".to_string(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "openai did not respond within 30s");
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn missing_credential_names_variable() {
        let err = Error::MissingCredential {
            provider: "gemini".to_string(),
            var: "GEMINI_API_KEY".to_string(),
        };
        assert_eq!(err.to_string(), "Missing GEMINI_API_KEY for provider 'gemini'");
    }
}
