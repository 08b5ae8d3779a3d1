//! Configuration parsing and validation for chatrelay.
//!
//! Every setting has a built-in default, so the relay runs without a config
//! file. A TOML file can override any subset of them; provider tables are
//! merged field-by-field over the built-in provider descriptors.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::provider::ProviderKind;

/// Persona sent as the system message to OpenAI-compatible providers.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    /// One entry per supported provider, in `ProviderKind::ALL` order.
    pub providers: Vec<ProviderConfig>,
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Provider used when a client does not name one
    #[serde(default)]
    pub default_provider: ProviderKind,
    /// System message for OpenAI-compatible providers
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Upper bound on a single user message, counted in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_message_chars() -> usize {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            default_provider: ProviderKind::default(),
            system_prompt: default_system_prompt(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Upstream HTTP client limits.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum wait for the provider's response headers
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    /// Maximum gap between two body chunks of a streamed response
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_response_timeout() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    30
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            response_timeout_secs: default_response_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The raw value is only reachable through [`ApiKey::expose_secret`], so every
/// place a key leaves the process can be found with `grep expose_secret`.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Where a provider's credential comes from at request time.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Literal `api_key` in the config file
    Literal,
    /// Environment variable (holds var name)
    Env(String),
    /// Nothing set; requests to this provider will fail
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::Env(var) => write!(f, "env ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Static descriptor for one upstream provider.
///
/// Built once at startup and shared read-only. The credential is not
/// resolved here: a missing key only fails the requests that need it.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API base URL (e.g., "https://api.groq.com/openai/v1")
    pub url: String,
    /// Model identifier sent upstream
    pub model: String,
    /// Environment variable holding the credential
    pub credential_env: String,
    /// Literal credential; takes precedence over `credential_env`
    pub api_key: Option<ApiKey>,
    pub enabled: bool,
}

impl ProviderConfig {
    /// Built-in descriptor for a provider.
    pub fn builtin(kind: ProviderKind) -> Self {
        let (url, model, credential_env) = match kind {
            ProviderKind::Groq => (
                "https://api.groq.com/openai/v1",
                "llama-3.3-70b-versatile",
                "GROQ_API_KEY",
            ),
            ProviderKind::OpenAi => ("https://api.openai.com/v1", "gpt-3.5-turbo", "OPENAI_API_KEY"),
            ProviderKind::Gemini => (
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-1.5-flash",
                "GEMINI_API_KEY",
            ),
        };

        Self {
            kind,
            url: url.to_string(),
            model: model.to_string(),
            credential_env: credential_env.to_string(),
            api_key: None,
            enabled: true,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Whether the provider streams partial output over SSE.
    pub fn streaming(&self) -> bool {
        self.kind.streaming()
    }

    /// Describe where the credential would come from, without reading it out.
    pub fn key_source_with<F>(&self, lookup: F) -> KeySource
    where
        F: Fn(&str) -> Option<String>,
    {
        if self
            .api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
        {
            return KeySource::Literal;
        }
        match lookup(&self.credential_env) {
            Some(value) if !value.is_empty() => KeySource::Env(self.credential_env.clone()),
            _ => KeySource::None,
        }
    }

    pub fn key_source(&self) -> KeySource {
        self.key_source_with(|name| std::env::var(name).ok())
    }

    /// Resolve the credential using a custom lookup.
    ///
    /// An unset or empty value is a [`Error::MissingCredential`].
    pub fn resolve_credential_with<F>(&self, lookup: F) -> Result<ApiKey, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_ref() {
            if !key.expose_secret().is_empty() {
                return Ok(key.clone());
            }
        }

        match lookup(&self.credential_env) {
            Some(value) if !value.is_empty() => Ok(ApiKey::from(value)),
            _ => Err(Error::MissingCredential {
                provider: self.name().to_string(),
                var: self.credential_env.clone(),
            }),
        }
    }

    /// Resolve the credential from the process environment.
    pub fn resolve_credential(&self) -> Result<ApiKey, Error> {
        self.resolve_credential_with(|name| std::env::var(name).ok())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default level for the `chatrelay` target when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Partial provider table as written in TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProviderConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub credential_env: Option<String>,
    pub api_key: Option<ApiKey>,
    pub enabled: Option<bool>,
}

/// Configuration as deserialized, before provider tables are merged.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, RawProviderConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            providers: ProviderKind::ALL
                .iter()
                .map(|kind| ProviderConfig::builtin(*kind))
                .collect(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge raw provider tables over the built-in descriptors.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut providers: Vec<ProviderConfig> = ProviderKind::ALL
            .iter()
            .map(|kind| ProviderConfig::builtin(*kind))
            .collect();

        for (name, overrides) in raw.providers {
            let kind: ProviderKind = name.parse().map_err(|_| {
                ConfigError::Validation(format!(
                    "Unknown provider '{}' (expected one of: groq, openai, gemini)",
                    name
                ))
            })?;

            let Some(provider) = providers.iter_mut().find(|p| p.kind == kind) else {
                continue;
            };
            if let Some(url) = overrides.url {
                provider.url = url;
            }
            if let Some(model) = overrides.model {
                provider.model = model;
            }
            if let Some(var) = overrides.credential_env {
                provider.credential_env = var;
            }
            if overrides.api_key.is_some() {
                provider.api_key = overrides.api_key;
            }
            if let Some(enabled) = overrides.enabled {
                provider.enabled = enabled;
            }
        }

        Ok(Config {
            server: raw.server,
            upstream: raw.upstream,
            providers,
            logging: raw.logging,
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_message_chars == 0 {
            return Err(ConfigError::Validation(
                "server.max_message_chars must be at least 1".to_string(),
            ));
        }

        if self.upstream.response_timeout_secs == 0 || self.upstream.idle_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream timeouts must be at least 1 second".to_string(),
            ));
        }

        for provider in &self.providers {
            if provider.url.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' has empty URL",
                    provider.name()
                )));
            }
            if provider.model.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' has empty model",
                    provider.name()
                )));
            }
        }

        if !self
            .provider(self.server.default_provider)
            .is_some_and(|p| p.enabled)
        {
            tracing::warn!(
                provider = %self.server.default_provider,
                "Default provider is disabled - messages without a model will be rejected"
            );
        }

        Ok(())
    }

    /// Look up a provider descriptor by kind.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }
}
