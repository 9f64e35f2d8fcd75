//! Supervises an external decoder process and yields raw PCM audio.

mod extractor;

pub use extractor::{AudioExtractor, AudioStats};
