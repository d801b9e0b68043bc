//! WebSocket endpoint handling.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::relay::Disposition;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One endpoint: frames from the socket go through the routing table; frames for the
/// socket arrive on a channel drained by a dedicated writer task. The first text frame
/// must be a hello, otherwise the connection is dropped.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = state.relay.connect(tx);

    let relay = state.relay.clone();
    let mut ping_interval = tokio::time::interval(state.config.ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let writer = tokio::spawn(async move {
        // The first tick completes immediately.
        ping_interval.tick().await;
        loop {
            tokio::select! {
                out = rx.recv() => {
                    let Some(text) = out else { break };
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        tracing::warn!(conn_id = %id, error = %e, "socket write failed");
                        relay.disconnect(id);
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if let Err(e) = ws_tx.send(Message::Ping(Bytes::new())).await {
                        tracing::warn!(conn_id = %id, error = %e, "keep-alive ping failed");
                        relay.disconnect(id);
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                tracing::debug!(conn_id = %id, "dropping binary frame");
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(conn_id = %id, error = %e, "socket read failed");
                break;
            }
        };
        if state.relay.handle_text(id, text.as_str()) == Disposition::Close {
            break;
        }
    }

    // Dropping the routing entry closes the writer's channel; it then sends a close frame.
    state.relay.disconnect(id);
    let _ = writer.await;
    tracing::debug!(conn_id = %id, "connection finished");
}
