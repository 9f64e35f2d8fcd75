//! `GET /api/v1/health`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::AppState;
use crate::api::models::HealthResponse;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_streams = state.session_manager.list().len();
    Json(HealthResponse {
        status: "ok",
        active_streams,
        version: state.settings.service_version.clone(),
    })
}
