//! Per-session top-level coordinator: couples the Audio Extractor to the STT
//! Client, normalizes token events into Segments, and drives the fan-out bus
//! and Chunk Aggregator.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::ChunkAggregatorRegistry;
use crate::audio::AudioExtractor;
use crate::config::Settings;
use crate::domain::{Segment, SessionStatus, StreamOptions, Word};
use crate::session::{PipelineHandle, SessionManager};
use crate::stt::{SttClient, SttToken, TokenEvent};

/// Everything a pipeline run needs; assembled by the admission handler.
pub struct PipelineContext {
    pub stream_id: String,
    pub session_id: String,
    pub hls_url: String,
    pub options: StreamOptions,
    pub settings: Arc<Settings>,
    pub session_manager: Arc<SessionManager>,
    pub aggregators: Arc<ChunkAggregatorRegistry>,
}

/// Starts the pipeline task and returns the handle the Session Manager
/// tracks it under. The caller must attach the handle before anything else
/// touches the session, so that an early failure's self-cleanup always has
/// a registered pipeline entry to remove.
pub fn spawn(ctx: PipelineContext) -> PipelineHandle {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let join = tokio::spawn(run(ctx, task_cancel));
    PipelineHandle { cancel, join }
}

async fn run(ctx: PipelineContext, cancel: CancellationToken) {
    let PipelineContext {
        stream_id,
        session_id,
        hls_url,
        options,
        settings,
        session_manager,
        aggregators,
    } = ctx;

    if let Err(err) = session_manager.set_status(&stream_id, SessionStatus::Starting, None) {
        warn!(stream_id = %stream_id, error = %err, "could not mark session starting");
        session_manager.complete_pipeline(&stream_id);
        return;
    }

    let (mut stt_client, mut stt_receiver) = match SttClient::connect(
        &settings.stt_ws_url,
        &settings.stt_api_key,
        &settings.stt_model,
        settings.stt_sample_rate,
        &options,
    )
    .await
    {
        Ok(pair) => pair,
        Err(err) => {
            error!(stream_id = %stream_id, error = %err, "STT connect failed, aborting session");
            let _ = session_manager.set_status(&stream_id, SessionStatus::Error, Some(err.to_string()));
            session_manager.complete_pipeline(&stream_id);
            return;
        }
    };

    let extractor = AudioExtractor::new(
        settings.ffmpeg_path.clone(),
        hls_url,
        settings.stt_sample_rate,
        settings.audio_chunk_size,
    );
    let (mut pcm_rx, _audio_stats) = extractor.spawn(cancel.clone());

    if let Err(err) = session_manager.set_status(&stream_id, SessionStatus::Active, None) {
        warn!(stream_id = %stream_id, error = %err, "could not mark session active");
        cancel.cancel();
        let _ = stt_client.disconnect().await;
        session_manager.complete_pipeline(&stream_id);
        return;
    }

    // Pump: extractor -> STT client. The pump owns the client's write half
    // for the lifetime of the session, per the "sole sender" invariant.
    let pump_cancel = cancel.clone();
    let pump_stream_id = stream_id.clone();
    let pump = tokio::spawn(async move {
        loop {
            let pcm = tokio::select! {
                _ = pump_cancel.cancelled() => break,
                chunk = pcm_rx.recv() => chunk,
            };
            match pcm {
                Some(pcm) => {
                    if let Err(err) = stt_client.send_audio(pcm).await {
                        warn!(stream_id = %pump_stream_id, error = %err, "failed to send audio frame");
                        break;
                    }
                }
                None => break,
            }
        }
        let _ = stt_client.disconnect().await;
    });

    let (aggregator, aggregator_join) =
        aggregators.create(&stream_id, &session_id, cancel.child_token());

    let started_at = Instant::now();
    let mut final_status = SessionStatus::Stopped;
    let mut final_error = None;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = stt_receiver.next_event() => event,
        };

        match event {
            Ok(Some(TokenEvent::Tokens(tokens))) => {
                if let Some(segment) = form_segment(&stream_id, started_at, tokens) {
                    session_manager.broadcast(&stream_id, segment.clone());
                    aggregator.add_segment(&segment);
                }
            }
            Ok(Some(TokenEvent::Finished)) | Ok(None) => break,
            Ok(Some(TokenEvent::Error { code, message })) => {
                final_status = SessionStatus::Error;
                final_error = Some(match code {
                    Some(code) => format!("STT error [{code}]: {message}"),
                    None => format!("STT error: {message}"),
                });
                break;
            }
            Err(err) => {
                final_status = SessionStatus::Error;
                final_error = Some(err.to_string());
                break;
            }
        }
    }

    cancel.cancel();
    if let Err(err) = pump.await {
        warn!(stream_id = %stream_id, error = %err, "pump task panicked");
    }
    if let Err(err) = aggregator_join.await {
        warn!(stream_id = %stream_id, error = %err, "aggregator flush task panicked");
    }
    aggregators.remove(&stream_id);

    let _ = session_manager.set_status(&stream_id, final_status, final_error);
    info!(stream_id = %stream_id, status = ?final_status, "pipeline finished");
    session_manager.complete_pipeline(&stream_id);
}

/// Builds at most one Segment from a token event batch, per §4.4's formation
/// rules. Returns `None` if every token's text is empty.
fn form_segment(stream_id: &str, started_at: Instant, tokens: Vec<SttToken>) -> Option<Segment> {
    let tokens: Vec<SttToken> = tokens.into_iter().filter(|t| !t.text.is_empty()).collect();
    if tokens.is_empty() {
        return None;
    }

    let is_final = tokens.iter().any(|t| t.is_final);
    let text = tokens.iter().map(|t| t.text.as_str()).collect::<String>();
    let words = tokens
        .iter()
        .map(|t| Word {
            text: t.text.clone(),
            start_time: t.start_time.unwrap_or(0.0),
            end_time: t.end_time.unwrap_or(0.0),
            confidence: t.confidence.unwrap_or(1.0),
            speaker: t.speaker.clone(),
            language: t.language.clone(),
        })
        .collect();

    Some(Segment {
        unique_id: stream_id.to_string(),
        segment_id: uuid::Uuid::new_v4().to_string(),
        wall_timestamp: chrono::Utc::now(),
        stream_time: started_at.elapsed().as_secs_f64(),
        text,
        is_final,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, is_final: bool) -> SttToken {
        SttToken {
            text: text.to_string(),
            is_final,
            start_time: None,
            end_time: None,
            confidence: None,
            speaker: None,
            language: None,
        }
    }

    #[test]
    fn empty_tokens_yield_no_segment() {
        let start = Instant::now();
        assert!(form_segment("abc", start, vec![token("", false)]).is_none());
    }

    #[test]
    fn text_concatenates_without_separator() {
        let start = Instant::now();
        let segment = form_segment("abc", start, vec![token("he", false), token("llo", true)]).unwrap();
        assert_eq!(segment.text, "hello");
        assert!(segment.is_final);
        assert_eq!(segment.words.len(), 2);
    }

    #[test]
    fn missing_fields_default_per_spec() {
        let start = Instant::now();
        let segment = form_segment("abc", start, vec![token("hi", false)]).unwrap();
        let word = &segment.words[0];
        assert_eq!(word.start_time, 0.0);
        assert_eq!(word.end_time, 0.0);
        assert_eq!(word.confidence, 1.0);
        assert!(word.speaker.is_none());
        assert!(word.language.is_none());
    }
}
