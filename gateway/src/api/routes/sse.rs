//! `GET /api/v1/transcribe/{stream_id}/stream`: real-time Segment delivery
//! over Server-Sent Events.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use futures::stream::{self, Stream};

use crate::api::AppState;
use crate::api::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/transcribe/{stream_id}/stream", get(subscribe))
}

async fn subscribe(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if state.session_manager.get(&stream_id).is_none() {
        return Err(ApiError::not_found(format!("no session for stream '{stream_id}'")));
    }

    let handle = state.session_manager.register_subscriber(&stream_id)?;

    let connected =
        stream::once(async { Ok::<Event, Infallible>(Event::default().event("connected").data("{}")) });
    let events = stream::unfold(
        (handle, state, stream_id, false),
        |(mut handle, state, stream_id, ended)| async move {
            if ended {
                return None;
            }
            tokio::select! {
                segment = handle.recv() => match segment {
                    Some(segment) => {
                        let data = serde_json::to_string(&segment).unwrap_or_default();
                        let event = Event::default().event("transcription").data(data);
                        Some((Ok::<Event, Infallible>(event), (handle, state, stream_id, false)))
                    }
                    None => {
                        state.session_manager.unregister_subscriber(&handle);
                        let event = Event::default().event("end").data("{}");
                        Some((Ok::<Event, Infallible>(event), (handle, state, stream_id, true)))
                    }
                },
                _ = tokio::time::sleep(crate::api::SUBSCRIBER_HEARTBEAT_INTERVAL) => {
                    if state.session_manager.get(&stream_id).is_none() {
                        state.session_manager.unregister_subscriber(&handle);
                        let event = Event::default().event("end").data("{}");
                        Some((Ok::<Event, Infallible>(event), (handle, state, stream_id, true)))
                    } else {
                        let event = Event::default().event("heartbeat").data("{}");
                        Some((Ok::<Event, Infallible>(event), (handle, state, stream_id, false)))
                    }
                }
            }
        },
    );

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}
