//! A single registered subscriber's delivery queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::domain::Segment;

/// Bounded queue capacity, per §4.5 suggested default.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// Handle returned to a caller that registered for a stream's segments.
///
/// Dropping it (or calling `unregister` through the owning manager) stops
/// delivery without affecting any other subscriber.
pub struct SubscriberHandle {
    pub(super) id: u64,
    pub(super) stream_id: String,
    pub(super) receiver: mpsc::Receiver<Segment>,
    pub(super) dropped: Arc<AtomicU64>,
}

impl SubscriberHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub async fn recv(&mut self) -> Option<Segment> {
        self.receiver.recv().await
    }

    /// Segments dropped for this subscriber because its queue was full.
    /// Policy (b) per §4.5: the new segment is dropped and this counter is
    /// bumped, rather than blocking the broadcaster or evicting an already
    /// queued item.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub(super) struct Slot {
    pub id: u64,
    pub sender: mpsc::Sender<Segment>,
    pub dropped: Arc<AtomicU64>,
}
