//! Status reporting collaborator.
//!
//! The core never prints. Everything the user should see (status lines,
//! the connection indicator, the session mode, the frame rate and
//! detection tallies) goes through a [`StatusSink`].

use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::{DetectionCounts, StatusLevel, StatusMessage};
use crate::state::SessionMode;

// ── ConnectionIndicator ──────────────────────────────────────────

/// Coarse connection state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionIndicator {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

// ── StatusSink ───────────────────────────────────────────────────

/// Receives user-facing updates from the session.
pub trait StatusSink: Send + Sync {
    /// A human-readable status line.
    fn status(&self, message: &StatusMessage);

    /// The connection indicator changed. `detail` is a short reason.
    fn connection(&self, indicator: ConnectionIndicator, detail: &str);

    /// The session mode changed.
    fn session(&self, _mode: SessionMode) {}

    /// A new inbound frame rate (frames per second).
    fn frame_rate(&self, fps: u32);

    /// Fire/smoke tallies parsed from a status line.
    fn detections(&self, _counts: &DetectionCounts) {}
}

// ── RecordingSink ────────────────────────────────────────────────

/// One update captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Status(StatusLevel, String),
    Connection(ConnectionIndicator, String),
    Session(SessionMode),
    FrameRate(u32),
    Detections(DetectionCounts),
}

/// Sink that keeps every update, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.lock().clone()
    }

    /// Status lines at `level`.
    pub fn messages(&self, level: StatusLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|u| match u {
                StatusUpdate::Status(l, m) if *l == level => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_connection(&self) -> Option<ConnectionIndicator> {
        self.lock().iter().rev().find_map(|u| match u {
            StatusUpdate::Connection(i, _) => Some(*i),
            _ => None,
        })
    }

    pub fn last_frame_rate(&self) -> Option<u32> {
        self.lock().iter().rev().find_map(|u| match u {
            StatusUpdate::FrameRate(fps) => Some(*fps),
            _ => None,
        })
    }

    fn push(&self, update: StatusUpdate) {
        self.lock().push(update);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StatusUpdate>> {
        self.updates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, message: &StatusMessage) {
        self.push(StatusUpdate::Status(message.level, message.message.clone()));
    }

    fn connection(&self, indicator: ConnectionIndicator, detail: &str) {
        self.push(StatusUpdate::Connection(indicator, detail.to_string()));
    }

    fn session(&self, mode: SessionMode) {
        self.push(StatusUpdate::Session(mode));
    }

    fn frame_rate(&self, fps: u32) {
        self.push(StatusUpdate::FrameRate(fps));
    }

    fn detections(&self, counts: &DetectionCounts) {
        self.push(StatusUpdate::Detections(*counts));
    }
}
