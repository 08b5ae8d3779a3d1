//! HTTP server setup and configuration.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, socket};
use crate::config::Config;
use crate::provider::ProviderAdapter;
use crate::relay::RelayController;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RelayController>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the adapter and controller for `config`.
    pub fn new(config: Config) -> crate::Result<Self> {
        let adapter = ProviderAdapter::new(&config)?;
        Ok(Self::with_adapter(adapter, config))
    }

    pub fn with_adapter(adapter: ProviderAdapter, config: Config) -> Self {
        let controller = RelayController::new(adapter, &config.server);
        Self {
            controller: Arc::new(controller),
            config: Arc::new(config),
        }
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Chat endpoints
        .route("/api/socket", get(socket::socket_handler))
        .route("/api/chat", post(handlers::chat))
        // Operational
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::list_providers))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    for provider in &config.providers {
        tracing::info!(
            provider = %provider.kind,
            model = %provider.model,
            enabled = provider.enabled,
            key_source = %provider.key_source(),
            "Provider configured"
        );
    }

    let state = AppState::new(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting chatrelay server");

    axum::serve(listener, app).await?;

    Ok(())
}
