//! `GET /api/v1/ws/transcribe/{stream_id}`: real-time Segment delivery over
//! a plain JSON-text-frame WebSocket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::debug;

use crate::api::AppState;
use crate::api::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/transcribe/{stream_id}", get(subscribe))
}

async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.session_manager.get(&stream_id).is_none() {
        return Err(ApiError::not_found(format!("no session for stream '{stream_id}'")));
    }
    Ok(ws.on_upgrade(move |socket| deliver(socket, state, stream_id)))
}

/// Drains the subscriber queue onto the socket until the client disconnects,
/// the subscriber is unregistered, or the underlying session disappears.
async fn deliver(mut socket: WebSocket, state: AppState, stream_id: String) {
    let mut handle = match state.session_manager.register_subscriber(&stream_id) {
        Ok(handle) => handle,
        Err(_) => {
            let _ = socket.close().await;
            return;
        }
    };

    loop {
        tokio::select! {
            segment = handle.recv() => {
                match segment {
                    Some(segment) => {
                        let payload = match serde_json::to_string(&segment) {
                            Ok(payload) => payload,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(crate::api::SUBSCRIBER_HEARTBEAT_INTERVAL) => {
                if state.session_manager.get(&stream_id).is_none() {
                    break;
                }
            }
        }
    }

    debug!(stream_id = %stream_id, "websocket subscriber disconnecting");
    state.session_manager.unregister_subscriber(&handle);
    let _ = socket.close().await;
}
