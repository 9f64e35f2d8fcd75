//! Crate-wide error type.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("stream_id '{0}' does not match ^[A-Za-z0-9_-]+$")]
    InvalidStreamId(String),

    #[error("session for stream '{0}' already exists")]
    AlreadyExists(String),

    #[error("session cap reached ({0} active)")]
    AtCapacity(usize),

    #[error("HLS stream not reachable at {0}")]
    StreamUnavailable(String),

    #[error("no session for stream '{0}'")]
    NotFound(String),

    #[error("invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("audio extractor error: {0}")]
    Extractor(String),

    #[error("STT provider error: {0}")]
    SttProvider(String),

    #[error("STT client is not connected")]
    SttNotConnected,

    #[error("chunk sink error: {0}")]
    Sink(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_stream_id(id: impl Into<String>) -> Self {
        Self::InvalidStreamId(id.into())
    }

    pub fn not_found(stream_id: impl Into<String>) -> Self {
        Self::NotFound(stream_id.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
