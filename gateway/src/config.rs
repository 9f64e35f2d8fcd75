//! Process configuration loaded from the environment.

use crate::error::{Error, Result};

/// Application settings loaded once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_name: String,
    pub service_version: String,
    pub bind_address: String,
    pub port: u16,

    /// Base URL used to build `{base}/{stream_id}/{stream_id}.m3u8`.
    pub hls_base_url: String,

    pub session_cap: usize,
    pub session_timeout_secs: u64,

    pub stt_ws_url: String,
    pub stt_api_key: String,
    pub stt_model: String,
    pub stt_sample_rate: u32,

    pub audio_chunk_size: usize,
    pub ffmpeg_path: String,

    pub chunk_duration_secs: u64,

    pub database_url: String,
    pub log_dir: String,
}

impl Settings {
    /// Load settings from environment variables, applying defaults where the spec allows one.
    ///
    /// Fails fast if a required variable (`HLS_BASE_URL`, `STT_API_KEY`) is missing.
    pub fn from_env() -> Result<Self> {
        let hls_base_url = require_env("HLS_BASE_URL")?;
        let stt_api_key = require_env("STT_API_KEY")?;

        Ok(Self {
            service_name: env_or("SERVICE_NAME", "transcription-gateway"),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0"),
            port: parse_env_or("PORT", 8000)?,
            hls_base_url,
            session_cap: parse_env_or("SESSION_CAP", 10)?,
            session_timeout_secs: parse_env_or("SESSION_TIMEOUT_SECS", 300)?,
            stt_ws_url: env_or(
                "STT_WS_URL",
                "wss://stt-rt.soniox.com/transcribe-websocket",
            ),
            stt_api_key,
            stt_model: env_or("STT_MODEL", "stt-rt-v3"),
            stt_sample_rate: parse_env_or("STT_SAMPLE_RATE", 16_000)?,
            audio_chunk_size: parse_env_or("AUDIO_CHUNK_SIZE", 8_000)?,
            ffmpeg_path: env_or("FFMPEG_PATH", "ffmpeg"),
            chunk_duration_secs: parse_env_or("CHUNK_DURATION_SECS", 5)?,
            database_url: env_or("DATABASE_URL", "sqlite:gateway.db?mode=rwc"),
            log_dir: env_or("LOG_DIR", "logs"),
        })
    }

    /// Build the HLS playlist URL for a stream id, per the `{base}/{id}/{id}.m3u8` convention.
    pub fn hls_url_for(&self, stream_id: &str) -> String {
        format!("{}/{}/{}.m3u8", self.hls_base_url, stream_id, stream_id)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| Error::config(format!("missing required environment variable {key}")))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| Error::config(format!("invalid value for {key}: '{value}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_url_follows_convention() {
        let settings = Settings {
            service_name: "x".into(),
            service_version: "0".into(),
            bind_address: "0.0.0.0".into(),
            port: 8000,
            hls_base_url: "https://cdn.example.com/live".into(),
            session_cap: 10,
            session_timeout_secs: 300,
            stt_ws_url: "wss://stt-rt.soniox.com/transcribe-websocket".into(),
            stt_api_key: "key".into(),
            stt_model: "stt-rt-v3".into(),
            stt_sample_rate: 16_000,
            audio_chunk_size: 8_000,
            ffmpeg_path: "ffmpeg".into(),
            chunk_duration_secs: 5,
            database_url: "sqlite::memory:".into(),
            log_dir: "logs".into(),
        };
        assert_eq!(
            settings.hls_url_for("abc-XYZ_01"),
            "https://cdn.example.com/live/abc-XYZ_01/abc-XYZ_01.m3u8"
        );
    }
}
