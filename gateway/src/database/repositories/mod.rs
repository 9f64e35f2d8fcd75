//! Repository layer for the chunk store.

pub mod chunk;

pub use chunk::{ChunkSink, SqlxChunkSink};
