//! WebSocket handler for the build status stream.
//!
//! On connect the client receives `connected`, then the current status.
//! After that every status transition and `reload` token is relayed until
//! the client goes away or the server shuts down.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::broadcaster::StatusBroadcaster;
use super::status::CONNECTED;
use crate::state::AppState;

/// Handle WebSocket upgrade for the status stream.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let broadcaster = Arc::clone(&state.broadcaster);
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Relay status messages to an established connection.
async fn handle_socket(mut socket: WebSocket, broadcaster: Arc<StatusBroadcaster>) {
    let Some(mut subscription) = broadcaster.subscribe() else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    let mut shutdown = broadcaster.shutdown_signal();

    if socket.send(Message::Text(CONNECTED.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                if socket.send(Message::Text(message.into())).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Pings are answered by axum; other client messages are ignored.
                    Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Best effort: the client may already be gone.
    let _ = socket.send(Message::Close(None)).await;
}
