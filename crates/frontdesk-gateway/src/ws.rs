//! WebSocket feed of store changes, so open screens can refresh without polling.
//!
//! Protocol:
//! ← Server sends: {"type":"connected","version":"0.1.0"}
//! ← Server sends: {"type":"tokens_changed","date":"2026-10-19"}
//! ← Server sends: {"type":"tasks_created","assignees":["rec-1"]}
//! ← Server sends: {"type":"task_updated","task_id":"..."}
//! ← Server sends: {"type":"suggestions_changed"}
//! ← Server sends: {"type":"lagged","skipped":3} when the client fell behind
//! → Client sends: "ping"  ← Server sends: {"type":"pong"}

use std::sync::Arc;

use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::IntoResponse,
};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;

use super::server::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.events.subscribe();
    tracing::info!(
        "📡 Change feed client connected ({} listening)",
        state.events.subscriber_count()
    );

    let hello = json!({ "type": "connected", "version": env!("CARGO_PKG_VERSION") });
    if send_json(&mut socket, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let frame = match event {
                    Ok(event) => serde_json::to_value(&event).unwrap_or(Value::Null),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("⚠️ Change feed client lagged by {skipped} events");
                        json!({ "type": "lagged", "skipped": skipped })
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_json(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) if text.as_str().trim() == "ping" => {
                    if send_json(&mut socket, &json!({ "type": "pong" })).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!("📡 Change feed client disconnected");
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), ()> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| {
            tracing::debug!("WS send failed: {e}");
        })
}
