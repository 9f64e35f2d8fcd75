//! Stateful WebSocket client for the remote speech-to-text provider.

mod client;
mod protocol;

pub use client::{SttClient, SttState};
pub use protocol::{SttToken, TokenEvent};
