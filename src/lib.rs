//! chatrelay - streaming chat relay for LLM providers
//!
//! Accepts chat messages over a WebSocket, forwards each one to groq, openai
//! or gemini, and streams the model's output back as it arrives.

pub mod api;
pub mod config;
pub mod error;
pub mod provider;
pub mod relay;

pub use config::Config;
pub use error::{Error, Result};
