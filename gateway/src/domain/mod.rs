//! Core domain types shared across the session, pipeline and fan-out layers.

mod session;

pub use session::{Session, SessionInfo, SessionStatus};

use serde::{Deserialize, Serialize};

/// Per-session knobs snapshotted at creation time; immutable afterward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub language_hints: Vec<String>,
    pub enable_language_id: bool,
    pub enable_speaker_diarization: bool,
    pub enable_endpoint_detection: bool,
    pub vocabulary: Vec<String>,
}

/// A single recognized token, scoped to the stream's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub speaker: Option<String>,
    pub language: Option<String>,
}

/// A normalized unit of transcription emitted by the pipeline orchestrator.
///
/// Immutable once emitted; segments for a session are produced in
/// non-decreasing `stream_time` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub unique_id: String,
    pub segment_id: String,
    pub wall_timestamp: chrono::DateTime<chrono::Utc>,
    pub stream_time: f64,
    pub text: String,
    pub is_final: bool,
    pub words: Vec<Word>,
}

/// One fixed-window aggregate of segments, persisted exactly once per flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub stream_id: String,
    pub session_id: String,
    pub chunk_timestamp: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub words: Vec<Word>,
    pub is_final: bool,
}
