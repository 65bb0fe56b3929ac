//! WebSocket transport: one RPC channel per connection.

use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use devbridge_core::Channel;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (channel, mut outbound) = Channel::flat();
    let id = state.group.add_channel(channel);
    info!("WebSocket client connected on channel {}", id);

    // Task: forward posted messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(data) = outbound.recv().await {
            if sender.send(Message::Text(data)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => state.group.receive(id, &text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => state.group.receive(id, text),
                Err(_) => warn!("Dropping non-UTF-8 frame on channel {}", id),
            },
            Ok(Message::Close(_)) => {
                debug!("WebSocket client closed channel {}", id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error on channel {}: {}", id, e);
                break;
            }
        }
    }

    state.group.remove_channel(id);
    send_task.abort();
    info!("WebSocket client disconnected from channel {}", id);
}
