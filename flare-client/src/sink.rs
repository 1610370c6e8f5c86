//! Status sink that reports through `tracing`.

use std::sync::atomic::{AtomicU32, Ordering};

use flare_core::{
    ConnectionIndicator, DetectionCounts, SessionMode, StatusLevel, StatusMessage, StatusSink,
};
use tracing::{debug, error, info, warn};

/// Prints user-facing updates as log lines.
///
/// Frame rates only reach `info` when they change, so a steady stream
/// doesn't flood the console once a second.
#[derive(Debug, Default)]
pub struct TracingSink {
    last_fps: AtomicU32,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for TracingSink {
    fn status(&self, message: &StatusMessage) {
        match message.level {
            StatusLevel::Error => error!("{}", message.message),
            StatusLevel::Warning => warn!("{}", message.message),
            StatusLevel::Info => info!("{}", message.message),
            StatusLevel::Other => debug!("status: {}", message.message),
        }
    }

    fn connection(&self, indicator: ConnectionIndicator, detail: &str) {
        match indicator {
            ConnectionIndicator::Disconnected => warn!("[{indicator}] {detail}"),
            _ => info!("[{indicator}] {detail}"),
        }
    }

    fn session(&self, mode: SessionMode) {
        info!("session: {mode:?}");
    }

    fn frame_rate(&self, fps: u32) {
        if self.last_fps.swap(fps, Ordering::Relaxed) != fps {
            info!("FPS: {fps}");
        } else {
            debug!("FPS: {fps}");
        }
    }

    fn detections(&self, counts: &DetectionCounts) {
        let show = |n: Option<u32>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
        info!("detections: fire {} smoke {}", show(counts.fire), show(counts.smoke));
    }
}
