//! WebSocket Streaming Endpoint
//!
//! Each connection gets its own task and a bounded channel registered
//! with the bridge. The task first replays the history snapshot as one
//! enveloped frame, then forwards live frames from the channel until the
//! client disconnects or the service shuts down.
//!
//! # Wire Format
//!
//! - On connect: `{"type": "history", "data": [Reading, ...]}` (oldest-first)
//! - Per reading: the bare `Reading` object with no envelope
//!
//! The envelope asymmetry is load-bearing: browser clients branch on the
//! presence of the `type` field.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use super::AppState;
use crate::domain::reading::Reading;

/// The enveloped replay frame sent once per connection.
#[derive(Debug, Serialize)]
struct HistoryFrame<'a> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    data: &'a [Reading],
}

/// Upgrade handler for `GET /ws`.
pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one client connection to completion.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let (frame_tx, mut frame_rx) = mpsc::channel::<Arc<str>>(state.client_channel_capacity);
    let client_id = state.bridge.register_client(frame_tx);
    tracing::info!(client_id, "WebSocket client connected");

    // Registered before the snapshot is taken, so a reading cannot land
    // between the two unseen; live frames queue behind the replay.
    let history = state.bridge.history();
    let replay = HistoryFrame {
        frame_type: "history",
        data: &history,
    };
    let sent = match serde_json::to_string(&replay) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(error) => {
            tracing::error!(client_id, %error, "Failed to serialize history frame");
            false
        }
    };

    if sent {
        loop {
            tokio::select! {
                frame = frame_rx.recv() => match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    // the bridge pruned this client after a delivery failure
                    None => break,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    // client-initiated payloads are ignored; reading them
                    // is what detects the disconnect
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::debug!(client_id, %error, "WebSocket receive error");
                        break;
                    }
                },
                () = state.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    state.bridge.remove_client(client_id);
    tracing::info!(client_id, "WebSocket client disconnected");
}
