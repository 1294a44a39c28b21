//! WebSocket continuous feed.
//!
//! Every connection gets its own feed stream. The stream is dropped as soon
//! as the client goes away, which stops its polling.

use crate::web::handlers::subscribers_exhausted;
use crate::web::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info, warn};

/// WebSocket upgrade handler for `GET /readings/latest`.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    match state.try_subscribe() {
        Some(permit) => ws.on_upgrade(move |socket| handle_websocket(socket, state, permit)),
        None => subscribers_exhausted(),
    }
}

async fn handle_websocket(socket: WebSocket, state: AppState, _permit: OwnedSemaphorePermit) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("Feed subscriber connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.feed.subscribe_until(state.shutdown().clone());

    loop {
        tokio::select! {
            frame = feed.next() => {
                let Some(frame) = frame else {
                    debug!("Feed ended for {}", client_id);
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };

                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize frame for {}: {}", client_id, e);
                        continue;
                    }
                };

                if let Err(e) = sender.send(Message::Text(json)).await {
                    warn!("Failed to send frame to {}: {}", client_id, e);
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => debug!("Ignoring client message from {}", client_id),
                Some(Err(e)) => {
                    warn!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            },
        }
    }

    info!("Feed subscriber disconnected: {}", client_id);
}
