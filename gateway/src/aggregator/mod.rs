//! Batches emitted segments into fixed-duration chunks for persistence.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::database::ChunkSink;
use crate::domain::{Chunk, Segment, Word};

/// Per-stream accumulation window. Closed (no window open) between flushes
/// that find nothing to emit.
struct Window {
    open: bool,
    stream_start: f64,
    stream_end: f64,
    text: String,
    words: Vec<Word>,
    last_segment_text: String,
    last_segment_words: Vec<Word>,
}

impl Window {
    fn closed() -> Self {
        Self {
            open: false,
            stream_start: 0.0,
            stream_end: 0.0,
            text: String::new(),
            words: Vec::new(),
            last_segment_text: String::new(),
            last_segment_words: Vec::new(),
        }
    }
}

/// One stream's worth of chunk accumulation state, flushed on a fixed timer.
pub struct ChunkAggregator {
    stream_id: String,
    session_id: String,
    sink: Arc<dyn ChunkSink>,
    window: Mutex<Window>,
}

/// Narrows a full [`Word`] down to the 4 fields a persisted chunk carries -
/// speaker/language are a real-time-only concern.
fn narrow(word: &Word) -> Word {
    Word {
        text: word.text.clone(),
        start_time: word.start_time,
        end_time: word.end_time,
        confidence: word.confidence,
        speaker: None,
        language: None,
    }
}

impl ChunkAggregator {
    fn new(stream_id: impl Into<String>, session_id: impl Into<String>, sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            stream_id: stream_id.into(),
            session_id: session_id.into(),
            sink,
            window: Mutex::new(Window::closed()),
        }
    }

    /// Folds one emitted segment into the current window. Mutually exclusive
    /// with a concurrent flush by virtue of sharing the same lock.
    pub fn add_segment(&self, segment: &Segment) {
        let mut window = self.window.lock();
        if !window.open {
            window.open = true;
            window.stream_start = segment.stream_time;
            window.stream_end = segment.stream_time;
            window.text.clear();
            window.words.clear();
        }
        window.stream_end = segment.stream_time;

        let trimmed = segment.text.trim();
        if segment.is_final {
            if !window.text.is_empty() && !trimmed.is_empty() {
                window.text.push(' ');
            }
            window.text.push_str(trimmed);
            window.words.extend(segment.words.iter().map(narrow));
        }
        window.last_segment_text = trimmed.to_string();
        window.last_segment_words = segment.words.iter().map(narrow).collect();
    }

    /// Fires on the periodic timer and on final shutdown. Emits at most one
    /// Chunk; does nothing if the window is empty.
    async fn flush(&self) {
        let chunk = {
            let mut window = self.window.lock();
            if !window.open {
                return;
            }
            let (text, words) = if window.text.is_empty() {
                (window.last_segment_text.clone(), window.last_segment_words.clone())
            } else {
                (window.text.clone(), window.words.clone())
            };
            let chunk = Chunk {
                stream_id: self.stream_id.clone(),
                session_id: self.session_id.clone(),
                chunk_timestamp: chrono::Utc::now().timestamp_millis(),
                start_time: window.stream_start,
                end_time: window.stream_end,
                text,
                words,
                is_final: true,
            };
            *window = Window::closed();
            chunk
        };

        if let Err(err) = self.sink.save_chunk(&chunk).await {
            warn!(stream_id = %self.stream_id, error = %err, "failed to persist chunk, dropping it");
        }
    }

    /// Runs the periodic flush loop until `cancel` fires, then performs one
    /// final flush of whatever window remains open.
    async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick fires immediately; discard it
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.flush().await,
            }
        }
        self.flush().await;
        debug!(stream_id = %self.stream_id, "chunk aggregator stopped");
    }
}

/// Process-wide registry of active per-stream aggregators, mirroring the
/// Session Manager's role for the fan-out side.
pub struct ChunkAggregatorRegistry {
    sink: Arc<dyn ChunkSink>,
    chunk_duration: Duration,
    aggregators: DashMap<String, Arc<ChunkAggregator>>,
}

impl ChunkAggregatorRegistry {
    pub fn new(sink: Arc<dyn ChunkSink>, chunk_duration: Duration) -> Self {
        Self {
            sink,
            chunk_duration,
            aggregators: DashMap::new(),
        }
    }

    /// Creates and registers an aggregator for `stream_id`, spawning its
    /// periodic flush task tied to `cancel`. Returns the aggregator (for
    /// `add_segment`) and the flush task's `JoinHandle` - the caller awaits
    /// the handle, which guarantees the final flush has run, before calling
    /// [`Self::remove`].
    pub fn create(
        &self,
        stream_id: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> (Arc<ChunkAggregator>, tokio::task::JoinHandle<()>) {
        let aggregator = Arc::new(ChunkAggregator::new(stream_id, session_id, self.sink.clone()));
        self.aggregators
            .insert(stream_id.to_string(), aggregator.clone());

        let period = self.chunk_duration;
        let run_handle = aggregator.clone();
        let join = tokio::spawn(async move {
            run_handle.run(period, cancel).await;
        });

        (aggregator, join)
    }

    /// Drops the registry entry for `stream_id`. Call only after the flush
    /// task's `JoinHandle` has been awaited.
    pub fn remove(&self, stream_id: &str) {
        self.aggregators.remove(stream_id);
    }

    pub fn get(&self, stream_id: &str) -> Option<Arc<ChunkAggregator>> {
        self.aggregators.get(stream_id).map(|entry| entry.clone())
    }

    pub fn chunk_sink(&self) -> Arc<dyn ChunkSink> {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as TokioMutex;

    struct RecordingSink {
        chunks: TokioMutex<Vec<Chunk>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                chunks: TokioMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn save_chunk(&self, chunk: &Chunk) -> crate::error::Result<()> {
            self.chunks.lock().await.push(chunk.clone());
            Ok(())
        }

        async fn chunks_for_stream(
            &self,
            _stream_id: &str,
            _start_timestamp: Option<i64>,
            _end_timestamp: Option<i64>,
        ) -> crate::error::Result<Vec<Chunk>> {
            Ok(self.chunks.lock().await.clone())
        }
    }

    fn segment(text: &str, is_final: bool, stream_time: f64) -> Segment {
        Segment {
            unique_id: "abc".to_string(),
            segment_id: uuid::Uuid::new_v4().to_string(),
            wall_timestamp: chrono::Utc::now(),
            stream_time,
            text: text.to_string(),
            is_final,
            words: vec![Word {
                text: text.to_string(),
                start_time: stream_time,
                end_time: stream_time + 0.5,
                confidence: 0.9,
                speaker: Some("0".to_string()),
                language: Some("en".to_string()),
            }],
        }
    }

    #[tokio::test]
    async fn final_segments_concatenate_with_single_space() {
        let sink = RecordingSink::new();
        let agg = ChunkAggregator::new("abc", "sess-1", sink.clone());
        agg.add_segment(&segment("alpha", true, 0.0));
        agg.add_segment(&segment("beta", true, 1.0));
        agg.add_segment(&segment("gamma", true, 2.0));
        agg.flush().await;

        let chunks = sink.chunks.lock().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "alpha beta gamma");
        assert_eq!(chunks[0].words.len(), 3);
        assert!(chunks[0].is_final);
    }

    #[tokio::test]
    async fn partial_only_window_falls_back_to_last_segment() {
        let sink = RecordingSink::new();
        let agg = ChunkAggregator::new("abc", "sess-1", sink.clone());
        agg.add_segment(&segment("par", false, 0.0));
        agg.add_segment(&segment("partial", false, 1.0));
        agg.flush().await;

        let chunks = sink.chunks.lock().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "partial");
        assert!(chunks[0].is_final);
    }

    #[tokio::test]
    async fn empty_window_flushes_nothing() {
        let sink = RecordingSink::new();
        let agg = ChunkAggregator::new("abc", "sess-1", sink.clone());
        agg.flush().await;
        assert!(sink.chunks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn narrowed_words_drop_speaker_and_language() {
        let sink = RecordingSink::new();
        let agg = ChunkAggregator::new("abc", "sess-1", sink.clone());
        agg.add_segment(&segment("hi", true, 0.0));
        agg.flush().await;

        let chunks = sink.chunks.lock().await;
        assert!(chunks[0].words[0].speaker.is_none());
        assert!(chunks[0].words[0].language.is_none());
    }
}
