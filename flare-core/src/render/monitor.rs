//! Inbound frame-rate monitor.
//!
//! Counts rendered frames and publishes an integer rate once per
//! window. Uses tokio's clock so paused-time tests can drive it.

use std::time::Duration;

use tokio::time::Instant;

/// Tumbling-window frame counter.
///
/// Every recorded frame increments the count; once at least `window`
/// has elapsed since the window started, the rate
/// `round(count * 1000 / elapsed_ms)` is returned and the window
/// restarts at that frame.
pub struct ThroughputMonitor {
    window: Duration,
    window_start: Instant,
    count: u32,
    last_rate: Option<u32>,
}

impl ThroughputMonitor {
    /// Create a monitor with a 1-second window starting now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a monitor whose first window starts at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            window: Duration::from_secs(1),
            window_start: start,
            count: 0,
            last_rate: None,
        }
    }

    /// Record one rendered frame now.
    pub fn record(&mut self) -> Option<u32> {
        self.record_at(Instant::now())
    }

    /// Record one rendered frame at `now`; returns the rate if this
    /// frame closed a window.
    pub fn record_at(&mut self, now: Instant) -> Option<u32> {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        let rate = (self.count as f64 * 1000.0 / elapsed.as_millis() as f64).round() as u32;
        self.count = 0;
        self.window_start = now;
        self.last_rate = Some(rate);
        Some(rate)
    }

    /// Discard the current window and start a new one at `now`, e.g.
    /// when a new stream starts.
    pub fn reset_at(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = now;
        self.last_rate = None;
    }

    /// Most recently published rate.
    pub fn last_rate(&self) -> Option<u32> {
        self.last_rate
    }

    /// Frames counted in the current window.
    pub fn pending(&self) -> u32 {
        self.count
    }
}

impl Default for ThroughputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_frames_over_one_second() {
        let t0 = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(t0);

        for i in 1..15 {
            assert_eq!(monitor.record_at(t0 + Duration::from_millis(i * 1000 / 15)), None);
        }
        assert_eq!(monitor.record_at(t0 + Duration::from_millis(1000)), Some(15));
        assert_eq!(monitor.pending(), 0);
        assert_eq!(monitor.last_rate(), Some(15));
    }

    #[test]
    fn rate_is_rounded_over_longer_window() {
        let t0 = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(t0);
        for _ in 0..9 {
            monitor.record_at(t0 + Duration::from_millis(100));
        }
        // 10 frames over 1500ms = 6.67 fps.
        assert_eq!(monitor.record_at(t0 + Duration::from_millis(1500)), Some(7));
    }

    #[test]
    fn window_restarts_after_publish() {
        let t0 = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(t0);
        monitor.record_at(t0 + Duration::from_millis(1000));
        assert_eq!(monitor.record_at(t0 + Duration::from_millis(1500)), None);
        assert_eq!(monitor.pending(), 1);
    }

    #[test]
    fn reset_clears_window() {
        let t0 = Instant::now();
        let mut monitor = ThroughputMonitor::starting_at(t0);
        monitor.record_at(t0 + Duration::from_millis(10));
        monitor.reset_at(t0 + Duration::from_millis(20));
        assert_eq!(monitor.pending(), 0);
        assert_eq!(monitor.last_rate(), None);
        assert_eq!(monitor.record_at(t0 + Duration::from_millis(900)), None);
    }
}
