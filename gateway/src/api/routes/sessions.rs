//! `GET /api/v1/sessions`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::AppState;
use crate::api::models::SessionListResponse;

pub fn router() -> Router<AppState> {
    Router::new().route("/sessions", get(list_sessions))
}

async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.session_manager.list(),
    })
}
