//! Request/response DTOs for the admission HTTP surface.

use serde::{Deserialize, Serialize};

use crate::domain::{SessionInfo, StreamOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub stream_id: String,
    #[serde(flatten)]
    pub options: StreamOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub session_id: String,
    pub status: &'static str,
    pub subscriber_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopRequest {
    pub stream_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
    pub stream_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_streams: usize,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunksQuery {
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
}
