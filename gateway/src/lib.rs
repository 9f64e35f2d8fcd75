//! Multi-tenant live-stream transcription gateway.
//!
//! Ingests an HLS stream per session, extracts PCM audio, relays it to a
//! remote speech-to-text provider over WebSocket, and fans the resulting
//! transcription segments out to real-time subscribers and a durable chunk
//! store. See the module docs on [`session`], [`pipeline`], [`audio`],
//! [`stt`] and [`aggregator`] for the per-component design.

pub mod aggregator;
pub mod api;
pub mod audio;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod stt;
