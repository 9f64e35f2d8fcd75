//! Route modules, nested under `/api/v1` to match the original source's
//! resource shape.

mod health;
mod sessions;
mod sse;
mod transcribe;
mod ws;

use axum::Router;

use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(health::router())
                .merge(transcribe::router())
                .merge(sessions::router())
                .merge(ws::router())
                .merge(sse::router()),
        )
        .with_state(state)
}
