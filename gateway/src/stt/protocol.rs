//! Wire types for the Soniox real-time transcription WebSocket API.
//!
//! Field names are the provider's wire contract and are preserved verbatim
//! rather than renamed to Rust convention where they already are one.

use serde::{Deserialize, Serialize};

use crate::domain::StreamOptions;

/// The single configuration frame sent immediately after connecting.
#[derive(Debug, Serialize)]
pub struct ConfigFrame {
    pub api_key: String,
    pub model: String,
    pub sample_rate: u32,
    pub num_channels: u8,
    pub audio_format: &'static str,
    pub enable_endpoint_detection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hints: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_language_identification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_speaker_diarization: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

#[derive(Debug, Serialize)]
pub struct Context {
    pub terms: Vec<String>,
}

impl ConfigFrame {
    pub fn new(api_key: String, model: String, sample_rate: u32, options: &StreamOptions) -> Self {
        Self {
            api_key,
            model,
            sample_rate,
            num_channels: 1,
            audio_format: "pcm_s16le",
            enable_endpoint_detection: options.enable_endpoint_detection,
            language_hints: (!options.language_hints.is_empty())
                .then(|| options.language_hints.clone()),
            enable_language_identification: options.enable_language_id.then_some(true),
            enable_speaker_diarization: options.enable_speaker_diarization.then_some(true),
            context: (!options.vocabulary.is_empty()).then(|| Context {
                terms: options.vocabulary.clone(),
            }),
        }
    }
}

/// A single recognized token as the provider emits it.
#[derive(Debug, Clone, Deserialize)]
pub struct SttToken {
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// One parsed server frame.
#[derive(Debug, Clone)]
pub enum TokenEvent {
    Tokens(Vec<SttToken>),
    Finished,
    Error { code: Option<String>, message: String },
}

/// The raw JSON shape of a server frame, prior to interpretation.
#[derive(Debug, Deserialize)]
pub struct ServerFrame {
    #[serde(default)]
    pub tokens: Option<Vec<SttToken>>,
    #[serde(default)]
    pub finished: Option<bool>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Interprets a raw text frame per §4.3's dispatch rules. Returns `None` for
/// a shape that carries none of the recognized fields - it is skipped.
pub fn parse_frame(raw: &str) -> serde_json::Result<Option<TokenEvent>> {
    let frame: ServerFrame = serde_json::from_str(raw)?;
    if let Some(message) = frame.error_message {
        return Ok(Some(TokenEvent::Error {
            code: frame.error_code,
            message,
        }));
    }
    if frame.finished == Some(true) {
        return Ok(Some(TokenEvent::Finished));
    }
    match frame.tokens {
        Some(tokens) if !tokens.is_empty() => Ok(Some(TokenEvent::Tokens(tokens))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_frame_omits_unset_optionals() {
        let options = StreamOptions::default();
        let frame = ConfigFrame::new("key".into(), "stt-rt-v3".into(), 16_000, &options);
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("language_hints").is_none());
        assert!(json.get("context").is_none());
        assert_eq!(json["audio_format"], "pcm_s16le");
        assert_eq!(json["num_channels"], 1);
    }

    #[test]
    fn parse_frame_recognizes_tokens() {
        let raw = r#"{"tokens":[{"text":"hi","is_final":true}]}"#;
        let event = parse_frame(raw).unwrap().unwrap();
        assert!(matches!(event, TokenEvent::Tokens(t) if t.len() == 1));
    }

    #[test]
    fn parse_frame_recognizes_finished() {
        let raw = r#"{"finished":true}"#;
        let event = parse_frame(raw).unwrap().unwrap();
        assert!(matches!(event, TokenEvent::Finished));
    }

    #[test]
    fn parse_frame_recognizes_error() {
        let raw = r#"{"error_code":"bad_request","error_message":"nope"}"#;
        let event = parse_frame(raw).unwrap().unwrap();
        assert!(matches!(event, TokenEvent::Error { .. }));
    }

    #[test]
    fn parse_frame_skips_empty_tokens_and_unrecognized_shapes() {
        assert!(parse_frame(r#"{"tokens":[]}"#).unwrap().is_none());
        assert!(parse_frame(r#"{"some_other_field":1}"#).unwrap().is_none());
    }
}
