//! Row model for the `chunks` table.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{Chunk, Word};
use crate::error::Result;

/// Row shape for the `chunks` table; `words` is stored as a JSON-encoded text
/// column rather than a native array, since sqlite has no array type.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub stream_id: String,
    pub session_id: String,
    pub chunk_timestamp: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub words: String,
    pub is_final: bool,
    pub created_at: String,
}

impl ChunkRow {
    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        Ok(Self {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            stream_id: chunk.stream_id.clone(),
            session_id: chunk.session_id.clone(),
            chunk_timestamp: chunk.chunk_timestamp,
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            text: chunk.text.clone(),
            words: serde_json::to_string(&chunk.words)?,
            is_final: chunk.is_final,
            created_at: Utc::now().to_rfc3339(),
        })
    }

    pub fn into_chunk(self) -> Result<Chunk> {
        let words: Vec<Word> = serde_json::from_str(&self.words)?;
        Ok(Chunk {
            stream_id: self.stream_id,
            session_id: self.session_id,
            chunk_timestamp: self.chunk_timestamp,
            start_time: self.start_time,
            end_time: self.end_time,
            text: self.text,
            words,
            is_final: self.is_final,
        })
    }
}
