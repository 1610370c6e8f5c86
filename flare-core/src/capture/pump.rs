//! Webcam frame pump.
//!
//! While the session is streaming the webcam, the pump grabs one frame
//! per tick from the [`MediaSource`], encodes it to JPEG and offers it
//! to the channel. Ticks never queue up: a slow grab or encode simply
//! skips the ticks it overlapped, and a frame the channel cannot take
//! right now is dropped.
//!
//! The pump owns the source once started and releases it on every
//! exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::encoder::{DEFAULT_JPEG_QUALITY, FrameEncoder};
use crate::capture::source::MediaSource;
use crate::state::SessionMode;
use crate::transport::{ChannelLink, WireMessage};

// ── PumpConfig ───────────────────────────────────────────────────

/// Configuration for [`CapturePump`].
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Time between captures.
    pub interval: Duration,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000 / 15),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// [`CapturePump::stop`] was called.
    Cancelled,
    /// The session left `StreamingWebcam`.
    SessionEnded,
    /// The channel was not open at the top of a tick.
    ChannelNotOpen,
}

// ── CapturePump ──────────────────────────────────────────────────

/// Handle to a running capture task.
pub struct CapturePump {
    cancel: CancellationToken,
    handle: JoinHandle<PumpExit>,
    frames_sent: Arc<AtomicU64>,
}

impl CapturePump {
    /// Start pumping frames from `source` into `link`.
    ///
    /// `mode` is the session's read-only mode view; the pump stops
    /// itself as soon as it no longer reads `StreamingWebcam`.
    pub fn spawn(
        source: Arc<dyn MediaSource>,
        link: ChannelLink,
        mode: watch::Receiver<SessionMode>,
        config: PumpConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let frames_sent = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run(
            source,
            link,
            mode,
            config,
            cancel.clone(),
            Arc::clone(&frames_sent),
        ));
        Self {
            cancel,
            handle,
            frames_sent,
        }
    }

    /// Signal the pump to stop. An in-flight grab is allowed to finish
    /// but its frame is discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Frames accepted by the channel so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Wait for the pump task to exit.
    pub async fn join(self) -> PumpExit {
        self.handle.await.unwrap_or(PumpExit::Cancelled)
    }
}

async fn run(
    source: Arc<dyn MediaSource>,
    link: ChannelLink,
    mode: watch::Receiver<SessionMode>,
    config: PumpConfig,
    cancel: CancellationToken,
    frames_sent: Arc<AtomicU64>,
) -> PumpExit {
    let encoder = FrameEncoder::new(config.quality);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "capture pump started ({:?} interval, quality {})",
        config.interval,
        encoder.quality()
    );

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            _ = ticker.tick() => {}
        }

        if *mode.borrow() != SessionMode::StreamingWebcam {
            break PumpExit::SessionEnded;
        }
        if !link.is_open() {
            break PumpExit::ChannelNotOpen;
        }

        let frame = match source.grab().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame grab failed, skipping tick: {e}");
                continue;
            }
        };

        // The session may have moved on while the grab was in flight.
        if cancel.is_cancelled() || *mode.borrow() != SessionMode::StreamingWebcam {
            debug!("discarding frame grabbed after the session changed");
            continue;
        }

        match encoder.encode(&frame) {
            Ok(jpeg) => {
                if link.send(WireMessage::Binary(jpeg)) {
                    frames_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => warn!("frame encode failed, skipping tick: {e}"),
        }
    };

    source.release();
    info!(
        "capture pump stopped ({exit:?}) after {} frames",
        frames_sent.load(Ordering::Relaxed)
    );
    exit
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, open_channel};

    #[tokio::test]
    async fn pumps_jpeg_frames_while_streaming() {
        let (channel, mut peer, _events) = open_channel().await;
        let source = FakeSource::new();
        let (_mode_tx, mode_rx) = watch::channel(SessionMode::StreamingWebcam);

        let pump = CapturePump::spawn(
            source.clone(),
            channel.link(),
            mode_rx,
            PumpConfig::default(),
        );

        for _ in 0..3 {
            let jpeg = peer.recv_binary().await.unwrap();
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        }
        assert!(pump.frames_sent() >= 3);

        pump.stop();
        assert_eq!(pump.join().await, PumpExit::Cancelled);
        assert!(source.is_released());
    }

    #[tokio::test]
    async fn stops_when_session_leaves_webcam() {
        let (channel, _peer, _events) = open_channel().await;
        let source = FakeSource::new();
        let (mode_tx, mode_rx) = watch::channel(SessionMode::StreamingWebcam);

        let pump = CapturePump::spawn(source.clone(), channel.link(), mode_rx, PumpConfig::default());
        mode_tx.send_replace(SessionMode::Idle);

        assert_eq!(pump.join().await, PumpExit::SessionEnded);
        assert!(source.is_released());
    }

    #[tokio::test]
    async fn stops_when_channel_not_open() {
        let (mut channel, _peer, _events) = open_channel().await;
        channel.close("test");
        let source = FakeSource::new();
        let (_mode_tx, mode_rx) = watch::channel(SessionMode::StreamingWebcam);

        let pump = CapturePump::spawn(source.clone(), channel.link(), mode_rx, PumpConfig::default());

        assert_eq!(pump.join().await, PumpExit::ChannelNotOpen);
        assert!(source.is_released());
        assert_eq!(source.grabs(), 0);
    }

    #[tokio::test]
    async fn grab_failure_skips_one_tick() {
        let (channel, mut peer, _events) = open_channel().await;
        let source = FakeSource::new();
        source.fail_next_grabs(2);
        let (_mode_tx, mode_rx) = watch::channel(SessionMode::StreamingWebcam);

        let pump = CapturePump::spawn(
            source.clone(),
            channel.link(),
            mode_rx,
            PumpConfig {
                interval: Duration::from_millis(5),
                ..PumpConfig::default()
            },
        );

        assert!(peer.recv_binary().await.is_some());
        assert!(source.grabs() >= 3);
        pump.stop();
        pump.join().await;
    }

    #[tokio::test]
    async fn encode_failure_skips_one_tick() {
        let (channel, mut peer, _events) = open_channel().await;
        let source = FakeSource::new();
        source.short_next_frames(1);
        let (_mode_tx, mode_rx) = watch::channel(SessionMode::StreamingWebcam);

        let pump = CapturePump::spawn(
            source.clone(),
            channel.link(),
            mode_rx,
            PumpConfig {
                interval: Duration::from_millis(5),
                ..PumpConfig::default()
            },
        );

        for _ in 0..2 {
            let jpeg = peer.recv_binary().await.unwrap();
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        }
        // The truncated first frame was grabbed but never sent.
        assert!(source.grabs() >= 3);
        assert!(pump.frames_sent() < source.grabs());
        pump.stop();
        assert_eq!(pump.join().await, PumpExit::Cancelled);
        assert!(source.is_released());
    }
}
