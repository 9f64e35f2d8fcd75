//! Session entity and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle status of a [`Session`]. Transitions are monotonic forward -
/// see [`SessionStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Starting,
    Active,
    Stopping,
    Stopped,
    Error,
}

impl SessionStatus {
    /// Whether the terminal states have been reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Error)
    }

    /// Whether `self` may reach past the stall-timeout watchdog unbothered.
    pub fn is_watchdog_exempt(self) -> bool {
        !matches!(self, SessionStatus::Pending | SessionStatus::Starting)
    }

    /// Validates a proposed transition without applying it.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Pending, Error)
                | (Starting, Active)
                | (Starting, Error)
                | (Starting, Stopping)
                | (Active, Stopping)
                | (Active, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
        ) || self == next
    }

    pub fn transition_to(self, next: SessionStatus) -> Result<SessionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidStateTransition {
                from: format!("{self:?}"),
                to: format!("{next:?}"),
            })
        }
    }
}

/// A single live or recently-live transcription session, keyed by `stream_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub stream_id: String,
    pub status: SessionStatus,
    pub hls_url: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(stream_id: impl Into<String>, hls_url: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            stream_id: stream_id.into(),
            status: SessionStatus::Pending,
            hls_url: hls_url.into(),
            started_at: Utc::now(),
            stopped_at: None,
            last_error: None,
        }
    }

    /// Applies a validated status transition in place, stamping `stopped_at`
    /// on terminal states.
    pub fn set_status(&mut self, next: SessionStatus, error: Option<String>) -> Result<()> {
        self.status = self.status.transition_to(next)?;
        if self.status.is_terminal() {
            self.stopped_at.get_or_insert(Utc::now());
        }
        if let Some(err) = error {
            self.last_error = Some(err);
        }
        Ok(())
    }
}

/// Snapshot of a session plus its current subscriber count, for `list()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub unique_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub connected_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_succeed() {
        let mut session = Session::new("abc", "https://example.com/abc/abc.m3u8");
        assert!(session.set_status(SessionStatus::Starting, None).is_ok());
        assert!(session.set_status(SessionStatus::Active, None).is_ok());
        assert!(session.set_status(SessionStatus::Stopping, None).is_ok());
        assert!(session.set_status(SessionStatus::Stopped, None).is_ok());
        assert!(session.stopped_at.is_some());
    }

    #[test]
    fn backward_transition_rejected() {
        let mut session = Session::new("abc", "https://example.com/abc/abc.m3u8");
        session.set_status(SessionStatus::Starting, None).unwrap();
        session.set_status(SessionStatus::Active, None).unwrap();
        let err = session.set_status(SessionStatus::Starting, None);
        assert!(err.is_err());
    }

    #[test]
    fn setting_same_status_is_idempotent() {
        let mut session = Session::new("abc", "https://example.com/abc/abc.m3u8");
        assert!(session.set_status(SessionStatus::Pending, None).is_ok());
    }

    #[test]
    fn error_records_last_error_and_stopped_at() {
        let mut session = Session::new("abc", "https://example.com/abc/abc.m3u8");
        session.set_status(SessionStatus::Starting, None).unwrap();
        session
            .set_status(SessionStatus::Error, Some("boom".to_string()))
            .unwrap();
        assert_eq!(session.last_error.as_deref(), Some("boom"));
        assert!(session.stopped_at.is_some());
    }

    #[test]
    fn pending_and_starting_are_not_watchdog_exempt() {
        assert!(!SessionStatus::Pending.is_watchdog_exempt());
        assert!(!SessionStatus::Starting.is_watchdog_exempt());
        assert!(SessionStatus::Active.is_watchdog_exempt());
    }
}
