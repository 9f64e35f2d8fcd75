//! `POST /api/v1/transcribe/start`, `POST /api/v1/transcribe/stop`, and the
//! read-only chunk history supplement at `GET /transcribe/{stream_id}/chunks`.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ChunksQuery, StartRequest, StartResponse, StopRequest, StopResponse};
use crate::api::validation::{probe_hls_availability, validate_stream_id};
use crate::domain::Chunk;
use crate::pipeline::{self, PipelineContext};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/transcribe/start", post(start))
        .route("/transcribe/stop", post(stop))
        .route("/transcribe/{stream_id}/chunks", get(chunks))
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> ApiResult<Json<StartResponse>> {
    validate_stream_id(&req.stream_id)?;

    let hls_url = state.settings.hls_url_for(&req.stream_id);
    probe_hls_availability(&state.http_client, &hls_url).await?;

    let session = state.session_manager.create(&req.stream_id, &hls_url)?;

    let ctx = PipelineContext {
        stream_id: req.stream_id.clone(),
        session_id: session.session_id.clone(),
        hls_url,
        options: req.options,
        settings: state.settings.clone(),
        session_manager: state.session_manager.clone(),
        aggregators: state.aggregators.clone(),
    };
    let handle = pipeline::spawn(ctx);
    state.session_manager.attach_pipeline(&req.stream_id, handle);

    Ok(Json(StartResponse {
        session_id: session.session_id,
        status: "started",
        subscriber_url: format!("/api/v1/ws/transcribe/{}", req.stream_id),
    }))
}

async fn stop(
    State(state): State<AppState>,
    Json(req): Json<StopRequest>,
) -> ApiResult<Json<StopResponse>> {
    state
        .session_manager
        .get(&req.stream_id)
        .ok_or_else(|| ApiError::not_found(format!("no session for stream '{}'", req.stream_id)))?;

    state.session_manager.remove(&req.stream_id).await;

    Ok(Json(StopResponse {
        status: "stopped",
        stream_id: req.stream_id,
    }))
}

async fn chunks(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(query): Query<ChunksQuery>,
) -> ApiResult<Json<Vec<Chunk>>> {
    let sink = state.aggregators.chunk_sink();
    let chunks = sink
        .chunks_for_stream(&stream_id, query.start_timestamp, query.end_timestamp)
        .await?;
    Ok(Json(chunks))
}
