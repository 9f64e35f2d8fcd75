//! The [`SessionManager`] itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Segment, Session, SessionInfo, SessionStatus};
use crate::error::{Error, Result};

use super::subscriber::{Slot, SubscriberHandle, SUBSCRIBER_QUEUE_CAPACITY};

/// Cancellation + quiescence handle for a running pipeline orchestrator task.
pub struct PipelineHandle {
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

struct Inner {
    sessions: HashMap<String, Session>,
    pipelines: HashMap<String, PipelineHandle>,
    subscribers: HashMap<String, Vec<Slot>>,
    next_subscriber_id: u64,
}

/// Singleton registry of active sessions.
///
/// All three maps (sessions, pipelines, subscribers) live behind one mutex -
/// every operation here is a single critical section, so admission and
/// capacity checks can never race each other.
pub struct SessionManager {
    inner: Mutex<Inner>,
    cap: usize,
    stall_timeout: Duration,
}

impl SessionManager {
    pub fn new(cap: usize, stall_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                pipelines: HashMap::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
            }),
            cap,
            stall_timeout,
        }
    }

    /// Admits a new session for `stream_id`, failing without side effects on
    /// conflict or capacity overrun.
    pub fn create(&self, stream_id: &str, hls_url: &str) -> Result<Session> {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(stream_id) {
            return Err(Error::AlreadyExists(stream_id.to_string()));
        }
        let active = inner
            .sessions
            .values()
            .filter(|s| !s.status.is_terminal())
            .count();
        if active >= self.cap {
            return Err(Error::AtCapacity(active));
        }
        let session = Session::new(stream_id, hls_url);
        inner.sessions.insert(stream_id.to_string(), session.clone());
        Ok(session)
    }

    pub fn get(&self, stream_id: &str) -> Option<Session> {
        self.inner.lock().sessions.get(stream_id).cloned()
    }

    /// Idempotent status setter; no-op transitions (same state) are allowed.
    pub fn set_status(
        &self,
        stream_id: &str,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(stream_id)
            .ok_or_else(|| Error::not_found(stream_id))?;
        session.set_status(status, error)
    }

    pub fn attach_pipeline(&self, stream_id: &str, handle: PipelineHandle) {
        self.inner
            .lock()
            .pipelines
            .insert(stream_id.to_string(), handle);
    }

    /// Cancels the attached pipeline, drops subscribers, and removes the
    /// session entry. Safe to call more than once - a second call is a no-op.
    pub async fn remove(&self, stream_id: &str) {
        let (pipeline, _) = {
            let mut inner = self.inner.lock();
            let pipeline = inner.pipelines.remove(stream_id);
            let session_existed = inner.sessions.remove(stream_id).is_some();
            inner.subscribers.remove(stream_id);
            (pipeline, session_existed)
        };
        if let Some(pipeline) = pipeline {
            pipeline.cancel.cancel();
            if let Err(err) = pipeline.join.await {
                warn!(stream_id, error = %err, "pipeline task panicked during removal");
            }
        }
    }

    /// Self-cleanup for a pipeline task's own natural completion.
    ///
    /// `remove()` cancels and awaits the pipeline's `JoinHandle`, which would
    /// deadlock if called from inside that very task. This variant only
    /// clears the registry entries - the caller is already on its way out,
    /// so there is nothing left to cancel or await. Dropping the subscriber
    /// slots closes their channels, which is what turns a subscriber's next
    /// `recv()` into the end-of-stream signal.
    pub fn complete_pipeline(&self, stream_id: &str) {
        let mut inner = self.inner.lock();
        inner.pipelines.remove(stream_id);
        inner.sessions.remove(stream_id);
        inner.subscribers.remove(stream_id);
    }

    pub fn register_subscriber(&self, stream_id: &str) -> Result<SubscriberHandle> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(stream_id) {
            return Err(Error::not_found(stream_id));
        }
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        inner
            .subscribers
            .entry(stream_id.to_string())
            .or_default()
            .push(Slot {
                id,
                sender: tx,
                dropped: dropped.clone(),
            });
        Ok(SubscriberHandle {
            id,
            stream_id: stream_id.to_string(),
            receiver: rx,
            dropped,
        })
    }

    pub fn unregister_subscriber(&self, handle: &SubscriberHandle) {
        let mut inner = self.inner.lock();
        if let Some(slots) = inner.subscribers.get_mut(&handle.stream_id) {
            slots.retain(|slot| slot.id != handle.id);
        }
    }

    /// Delivers `segment` to every subscriber of `stream_id` using
    /// policy (b) from §4.5: a full queue has the *new* segment dropped and
    /// a per-slot counter bumped, rather than blocking the broadcaster or
    /// any other subscriber. A disconnected receiver's error is ignored -
    /// unregistration races this and is allowed to win.
    pub fn broadcast(&self, stream_id: &str, segment: Segment) {
        let senders: Vec<(mpsc::Sender<Segment>, Arc<AtomicU64>)> = {
            let inner = self.inner.lock();
            match inner.subscribers.get(stream_id) {
                Some(slots) => slots
                    .iter()
                    .map(|slot| (slot.sender.clone(), slot.dropped.clone()))
                    .collect(),
                None => return,
            }
        };
        for (sender, dropped) in senders {
            if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(segment.clone()) {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock();
        let now = chrono::Utc::now();
        inner
            .sessions
            .values()
            .map(|session| SessionInfo {
                session_id: session.session_id.clone(),
                unique_id: session.stream_id.clone(),
                status: session.status,
                started_at: session.started_at,
                uptime_seconds: (now - session.started_at).num_seconds().max(0),
                connected_clients: inner
                    .subscribers
                    .get(&session.stream_id)
                    .map(Vec::len)
                    .unwrap_or(0),
            })
            .collect()
    }

    /// Cancels every running pipeline and clears all state. Called once on
    /// process shutdown.
    pub async fn shutdown(&self) {
        let stream_ids: Vec<String> = self.inner.lock().sessions.keys().cloned().collect();
        for stream_id in stream_ids {
            self.remove(&stream_id).await;
        }
    }

    /// Background watchdog: sessions stuck in `pending`/`starting` past the
    /// configured stall timeout are torn down with a recorded error. Exempt
    /// once a session reaches `active`.
    pub async fn run_stall_watchdog(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }
            let stuck: Vec<String> = {
                let inner = self.inner.lock();
                let now = chrono::Utc::now();
                inner
                    .sessions
                    .values()
                    .filter(|s| {
                        !s.status.is_watchdog_exempt()
                            && (now - s.started_at).to_std().unwrap_or_default() > self.stall_timeout
                    })
                    .map(|s| s.stream_id.clone())
                    .collect()
            };
            for stream_id in stuck {
                warn!(stream_id, "session start timeout, tearing down");
                let _ = self.set_status(
                    &stream_id,
                    SessionStatus::Error,
                    Some("session start timeout".to_string()),
                );
                self.remove(&stream_id).await;
                info!(stream_id, "removed stalled session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(2, Duration::from_secs(300))
    }

    #[test]
    fn create_rejects_duplicate_stream_id() {
        let mgr = manager();
        mgr.create("abc", "https://x/abc/abc.m3u8").unwrap();
        let err = mgr.create("abc", "https://x/abc/abc.m3u8");
        assert!(matches!(err, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn create_rejects_past_capacity() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        mgr.create("b", "https://x/b/b.m3u8").unwrap();
        let err = mgr.create("c", "https://x/c/c.m3u8");
        assert!(matches!(err, Err(Error::AtCapacity(_))));
    }

    #[test]
    fn terminal_sessions_do_not_count_toward_capacity() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        mgr.set_status("a", SessionStatus::Starting, None).unwrap();
        mgr.set_status("a", SessionStatus::Error, Some("boom".into()))
            .unwrap();
        mgr.create("b", "https://x/b/b.m3u8").unwrap();
        assert!(mgr.create("c", "https://x/c/c.m3u8").is_ok());
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_a_no_op() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        mgr.broadcast("a", sample_segment());
    }

    #[tokio::test]
    async fn registered_subscriber_receives_broadcast_segment() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        let mut handle = mgr.register_subscriber("a").unwrap();
        mgr.broadcast("a", sample_segment());
        let received = handle.recv().await.unwrap();
        assert_eq!(received.unique_id, "a");
    }

    #[tokio::test]
    async fn unregistered_subscriber_receives_nothing_further() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        let handle = mgr.register_subscriber("a").unwrap();
        mgr.unregister_subscriber(&handle);
        mgr.broadcast("a", sample_segment());
        drop(handle);
    }

    #[tokio::test]
    async fn full_queue_drops_new_segment_and_counts_it() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        let mut handle = mgr.register_subscriber("a").unwrap();

        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY {
            mgr.broadcast("a", sample_segment());
        }
        assert_eq!(handle.dropped_count(), 0);

        // The queue is now full; this segment has nowhere to go and must be
        // dropped rather than blocking the broadcaster or evicting an
        // already-queued item.
        mgr.broadcast("a", sample_segment());
        assert_eq!(handle.dropped_count(), 1);

        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY {
            assert!(handle.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn complete_pipeline_closes_subscriber_channel() {
        let mgr = manager();
        mgr.create("a", "https://x/a/a.m3u8").unwrap();
        let mut handle = mgr.register_subscriber("a").unwrap();
        mgr.complete_pipeline("a");
        assert!(mgr.get("a").is_none());
        assert!(handle.recv().await.is_none());
    }

    fn sample_segment() -> Segment {
        Segment {
            unique_id: "a".to_string(),
            segment_id: "seg-1".to_string(),
            wall_timestamp: chrono::Utc::now(),
            stream_time: 1.0,
            text: "hello".to_string(),
            is_final: true,
            words: vec![],
        }
    }
}
