//! Session tunables.

use std::time::Duration;

use crate::capture::{CaptureConstraints, DEFAULT_JPEG_QUALITY, PumpConfig};
use crate::transport::ChannelConfig;

/// Configuration for [`StreamingSession`](crate::session::StreamingSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Detector websocket endpoint.
    pub endpoint: String,
    /// Delay before reconnecting after the channel is lost.
    pub reconnect_delay: Duration,
    /// How long a start request may wait for the channel to open.
    pub pending_intent_window: Duration,
    /// Time between webcam captures.
    pub capture_interval: Duration,
    /// JPEG quality for outbound frames, 1..=100.
    pub jpeg_quality: u8,
    /// Outbound message queue depth.
    pub outbound_queue: usize,
    /// Session event queue depth.
    pub event_queue: usize,
    /// Ideal camera geometry and rate.
    pub constraints: CaptureConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:5000/video_feed".into(),
            reconnect_delay: Duration::from_millis(3000),
            pending_intent_window: Duration::from_millis(2000),
            capture_interval: Duration::from_millis(1000 / 15),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            outbound_queue: 8,
            event_queue: 256,
            constraints: CaptureConstraints::default(),
        }
    }
}

impl SessionConfig {
    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            endpoint: self.endpoint.clone(),
            reconnect_delay: self.reconnect_delay,
            outbound_queue: self.outbound_queue,
        }
    }

    pub fn pump(&self) -> PumpConfig {
        PumpConfig {
            interval: self.capture_interval,
            quality: self.jpeg_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_detector_contract() {
        let config = SessionConfig::default();
        assert!(config.endpoint.ends_with("/video_feed"));
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.pending_intent_window, Duration::from_secs(2));
        assert_eq!(config.capture_interval, Duration::from_millis(66));
        assert_eq!(config.pump().quality, 80);
        assert_eq!(config.constraints.ideal_fps, 15);
    }
}
