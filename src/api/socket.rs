//! WebSocket transport for the relay.
//!
//! One socket is one connection. Inbound text frames go to
//! [`RelayController::handle`]; outbound events are queued on a channel and
//! written by a single writer task, which keeps them in emission order.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::server::AppState;
use crate::relay::{emit, OutboundEvent, RelayController};

/// Handle GET /api/socket
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.controller))
}

async fn handle_socket(socket: WebSocket, controller: Arc<RelayController>) {
    let connection_id = controller.connect();
    let (mut sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<OutboundEvent>();

    let mut writer = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode outbound event");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(frame)).await {
                tracing::debug!(error = %e, "Socket write failed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => controller.handle(connection_id, &text, &tx),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => controller.handle(connection_id, &text, &tx),
                    Err(_) => emit(
                        &tx,
                        OutboundEvent::AiMessageError("Binary frames must be UTF-8 text".to_string()),
                    ),
                },
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by axum
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    controller.disconnect(connection_id);
    writer.abort();
}
