//! Fakes shared by the unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::capture::{CaptureConstraints, CapturedFrame, MediaProvider, MediaSource, PixelFormat};
use crate::error::FlareError;
use crate::session::SessionEvent;
use crate::transport::{ChannelConfig, MemoryConnector, MemoryPeer, TransportChannel};
use crate::upload::VideoUploader;

// ── Media ────────────────────────────────────────────────────────

/// Camera stand-in producing a flat 64×48 frame.
#[derive(Default)]
pub struct FakeSource {
    grabs: AtomicU64,
    fail_next: AtomicU32,
    short_next: AtomicU32,
    released: AtomicBool,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_grabs(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// The next `n` grabs succeed but carry a truncated buffer.
    pub fn short_next_frames(&self, n: u32) {
        self.short_next.store(n, Ordering::SeqCst);
    }

    pub fn grabs(&self) -> u64 {
        self.grabs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn grab(&self) -> Result<CapturedFrame, FlareError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FlareError::Capture("camera hiccup".into()));
        }
        let short = self
            .short_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let len = if short { 64 * 3 } else { 64 * 48 * 3 };
        Ok(CapturedFrame::packed(64, 48, PixelFormat::Rgb8, vec![90; len]))
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Hands out a fresh [`FakeSource`] per acquisition, or denies access.
#[derive(Default)]
pub struct FakeProvider {
    deny: Option<String>,
    acquisitions: AtomicU32,
    last: Mutex<Option<Arc<FakeSource>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying(reason: &str) -> Self {
        Self {
            deny: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn acquisitions(&self) -> u32 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn last_source(&self) -> Option<Arc<FakeSource>> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaProvider for FakeProvider {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaSource>, FlareError> {
        if let Some(reason) = &self.deny {
            return Err(FlareError::MediaUnavailable(reason.clone()));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let source = FakeSource::new();
        *self.last.lock().unwrap() = Some(Arc::clone(&source));
        Ok(source)
    }
}

// ── Upload ───────────────────────────────────────────────────────

pub struct FakeUploader {
    result: Result<String, String>,
    calls: AtomicU32,
}

impl FakeUploader {
    pub fn accepting(filename: &str) -> Self {
        Self {
            result: Ok(filename.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoUploader for FakeUploader {
    async fn upload(&self, _file: &Path) -> Result<String, FlareError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(FlareError::Upload)
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// A transport channel that is already open, with its detector end.
pub async fn open_channel() -> (TransportChannel, MemoryPeer, mpsc::Receiver<SessionEvent>) {
    let (connector, mut accept) = MemoryConnector::new();
    let (tx, mut rx) = mpsc::channel(64);
    let mut channel = TransportChannel::new(Arc::new(connector), ChannelConfig::default(), tx);

    assert!(channel.connect());
    match rx.recv().await.unwrap() {
        SessionEvent::ChannelOpened { generation } => assert!(channel.on_opened(generation)),
        other => panic!("expected open, got {}", other.name()),
    }
    let peer = accept.recv().await.unwrap();
    (channel, peer, rx)
}

// ── Images ───────────────────────────────────────────────────────

/// A JPEG of the given size.
pub fn jpeg_of_size(width: u32, height: u32) -> Bytes {
    let data = vec![200u8; (width * height * 3) as usize];
    let frame = CapturedFrame::packed(width, height, PixelFormat::Rgb8, data);
    crate::capture::FrameEncoder::default().encode(&frame).unwrap()
}

/// Poll `cond` until it holds, failing after five seconds of wall time.
pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(std::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
