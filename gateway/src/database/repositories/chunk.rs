//! Chunk sink: the Chunk Aggregator's only persistence dependency.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ChunkRow;
use crate::domain::Chunk;
use crate::error::Result;

/// Narrow persistence boundary for the Chunk Aggregator.
///
/// Kept to exactly the two operations the aggregator and the chunk-history
/// API need, so a different backend can be substituted without touching
/// either caller.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn save_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Chunks for `stream_id` ordered by `chunk_timestamp`, optionally bounded
    /// by an inclusive `[start_timestamp, end_timestamp]` window (ms epoch).
    async fn chunks_for_stream(
        &self,
        stream_id: &str,
        start_timestamp: Option<i64>,
        end_timestamp: Option<i64>,
    ) -> Result<Vec<Chunk>>;
}

pub struct SqlxChunkSink {
    pool: SqlitePool,
}

impl SqlxChunkSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkSink for SqlxChunkSink {
    async fn save_chunk(&self, chunk: &Chunk) -> Result<()> {
        let row = ChunkRow::from_chunk(chunk)?;
        sqlx::query(
            r#"
            INSERT INTO chunks
                (chunk_id, stream_id, session_id, chunk_timestamp, start_time, end_time, text, words, is_final, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.chunk_id)
        .bind(&row.stream_id)
        .bind(&row.session_id)
        .bind(row.chunk_timestamp)
        .bind(row.start_time)
        .bind(row.end_time)
        .bind(&row.text)
        .bind(&row.words)
        .bind(row.is_final)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn chunks_for_stream(
        &self,
        stream_id: &str,
        start_timestamp: Option<i64>,
        end_timestamp: Option<i64>,
    ) -> Result<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT chunk_id, stream_id, session_id, chunk_timestamp, start_time, end_time, text, words, is_final, created_at
            FROM chunks
            WHERE stream_id = ?1
              AND (?2 IS NULL OR chunk_timestamp >= ?2)
              AND (?3 IS NULL OR chunk_timestamp <= ?3)
            ORDER BY chunk_timestamp ASC
            "#,
        )
        .bind(stream_id)
        .bind(start_timestamp)
        .bind(end_timestamp)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChunkRow::into_chunk).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Word;

    fn sample_chunk() -> Chunk {
        Chunk {
            stream_id: "abc".to_string(),
            session_id: "sess-1".to_string(),
            chunk_timestamp: 1_000,
            start_time: 0.0,
            end_time: 5.0,
            text: "hello world".to_string(),
            words: vec![Word {
                text: "hello".to_string(),
                start_time: 0.0,
                end_time: 0.5,
                confidence: 0.9,
                speaker: None,
                language: None,
            }],
            is_final: true,
        }
    }

    #[test]
    fn row_round_trips_through_json_words_column() {
        let chunk = sample_chunk();
        let row = ChunkRow::from_chunk(&chunk).unwrap();
        let restored = row.into_chunk().unwrap();
        assert_eq!(restored.text, chunk.text);
        assert_eq!(restored.words.len(), 1);
        assert_eq!(restored.words[0].text, "hello");
    }

    #[tokio::test]
    async fn save_then_query_round_trips_through_sqlite() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE chunks (
                chunk_id TEXT PRIMARY KEY,
                stream_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                chunk_timestamp INTEGER NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                text TEXT NOT NULL,
                words TEXT NOT NULL,
                is_final BOOLEAN NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let sink = SqlxChunkSink::new(pool);
        let chunk = sample_chunk();
        sink.save_chunk(&chunk).await.unwrap();

        let fetched = sink.chunks_for_stream("abc", None, None).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].text, "hello world");

        let bounded = sink.chunks_for_stream("abc", Some(2_000), None).await.unwrap();
        assert!(bounded.is_empty());
    }
}
