//! Relay session controller.
//!
//! Each accepted message becomes one turn running on its own task: the
//! provider's fragments are forwarded as `ai_message_chunk` events in the
//! order produced, followed by exactly one `ai_message_done` or
//! `ai_message_error`.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::{parse_frame, OutboundEvent};
use super::session::{ConnectionId, SessionRegistry, SessionStatus};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::provider::{ChatRequest, ProviderAdapter, ProviderKind};

/// Outbound half of a client connection.
pub type EventSink = mpsc::UnboundedSender<OutboundEvent>;

/// Owns the session registry and drives turns through the provider adapter.
pub struct RelayController {
    adapter: ProviderAdapter,
    sessions: Arc<SessionRegistry>,
    default_provider: ProviderKind,
    max_message_chars: usize,
}

impl RelayController {
    pub fn new(adapter: ProviderAdapter, server: &ServerConfig) -> Self {
        Self {
            adapter,
            sessions: Arc::new(SessionRegistry::new()),
            default_provider: server.default_provider,
            max_message_chars: server.max_message_chars,
        }
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }

    /// Register a new client connection.
    pub fn connect(&self) -> ConnectionId {
        let connection_id = ConnectionId::new();
        tracing::info!(connection_id = %connection_id, "Client connected");
        connection_id
    }

    /// Handle one inbound frame from `connection_id`.
    ///
    /// Invalid frames and messages arriving while a turn is in flight are
    /// answered with a single `ai_message_error`; the in-flight turn is not
    /// touched. Must be called from within a tokio runtime.
    pub fn handle(&self, connection_id: ConnectionId, raw: &str, outbound: &EventSink) {
        let request = match parse_frame(raw)
            .and_then(|m| m.into_request(self.default_provider, self.max_message_chars))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Rejected user message");
                emit(outbound, OutboundEvent::AiMessageError(e.to_string()));
                return;
            }
        };

        let turn_id = match self.sessions.try_begin(connection_id, request.provider()) {
            Ok(turn_id) => turn_id,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    provider = %request.provider(),
                    "Rejected message while a turn is in flight"
                );
                emit(outbound, OutboundEvent::AiMessageError(e.to_string()));
                return;
            }
        };

        tracing::info!(
            connection_id = %connection_id,
            turn_id = %turn_id,
            provider = %request.provider(),
            chars = request.text().chars().count(),
            "Received user message"
        );

        let turn = Turn {
            adapter: self.adapter.clone(),
            sessions: self.sessions.clone(),
            connection_id,
            turn_id,
            outbound: outbound.clone(),
        };
        let task = tokio::spawn(turn.run(request));
        self.sessions
            .attach_task(connection_id, turn_id, task.abort_handle());
    }

    /// Abandon whatever the connection has in flight. No further events are sent.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        match self.sessions.abandon(connection_id) {
            Some(session) if session.status.is_active() => {
                tracing::info!(
                    connection_id = %connection_id,
                    turn_id = %session.turn_id,
                    "Client disconnected mid-turn, upstream request abandoned"
                );
            }
            _ => tracing::info!(connection_id = %connection_id, "Client disconnected"),
        }
    }
}

/// Everything one turn's task owns.
struct Turn {
    adapter: ProviderAdapter,
    sessions: Arc<SessionRegistry>,
    connection_id: ConnectionId,
    turn_id: Uuid,
    outbound: EventSink,
}

impl Turn {
    async fn run(self, request: ChatRequest) {
        let started = std::time::Instant::now();
        self.sessions
            .transition(self.connection_id, self.turn_id, SessionStatus::Streaming);

        match self.forward(&request).await {
            Ok(fragments) => {
                if self
                    .sessions
                    .transition(self.connection_id, self.turn_id, SessionStatus::Done)
                {
                    emit(&self.outbound, OutboundEvent::AiMessageDone);
                    tracing::info!(
                        connection_id = %self.connection_id,
                        turn_id = %self.turn_id,
                        provider = %request.provider(),
                        fragments,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Turn complete"
                    );
                }
            }
            Err(e) => {
                let message = e.to_string();
                if self
                    .sessions
                    .fail(self.connection_id, self.turn_id, message.clone())
                {
                    tracing::warn!(
                        connection_id = %self.connection_id,
                        turn_id = %self.turn_id,
                        provider = %request.provider(),
                        error = %message,
                        "Turn failed"
                    );
                    emit(&self.outbound, OutboundEvent::AiMessageError(message));
                }
            }
        }

        self.sessions.finish(self.connection_id, self.turn_id);
    }

    /// Forward fragments until the stream ends. Returns the fragment count.
    async fn forward(&self, request: &ChatRequest) -> Result<usize> {
        let mut stream = self.adapter.dispatch(request)?;
        let mut count = 0;

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if !self.sessions.is_current(self.connection_id, self.turn_id) {
                break;
            }
            if self
                .outbound
                .send(OutboundEvent::AiMessageChunk(fragment.into_string()))
                .is_err()
            {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    "Outbound channel closed, dropping remaining fragments"
                );
                break;
            }
            count += 1;
        }

        Ok(count)
    }
}

/// Queue `event`, logging if the connection's writer is already gone.
pub(crate) fn emit(outbound: &EventSink, event: OutboundEvent) {
    if outbound.send(event).is_err() {
        tracing::debug!("Outbound channel closed, event dropped");
    }
}
