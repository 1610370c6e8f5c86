//! Inbound frame render task.
//!
//! Binary payloads from the channel are submitted into a single-slot
//! `watch` mailbox; the render task always takes the newest one, so a
//! frame that arrives while another is being decoded replaces any
//! frame still waiting. Decoding and presenting run on the blocking
//! pool, so surfaces may do file or GPU work in `present`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::render::monitor::ThroughputMonitor;
use crate::render::renderer::FrameRenderer;
use crate::render::surface::OutputSurface;
use crate::status::StatusSink;

#[derive(Default)]
struct PipelineStats {
    submitted: AtomicU64,
    rendered: AtomicU64,
    failed: AtomicU64,
    window_restart: Mutex<Option<Instant>>,
}

/// Handle to the render task.
pub struct RenderPipeline {
    mailbox: watch::Sender<Option<Bytes>>,
    stats: Arc<PipelineStats>,
    handle: JoinHandle<()>,
}

impl RenderPipeline {
    /// Start rendering onto `surface`, publishing the frame rate to
    /// `status`.
    pub fn spawn(
        surface: Box<dyn OutputSurface>,
        status: Arc<dyn StatusSink>,
        renderer: FrameRenderer,
    ) -> Self {
        let (mailbox, rx) = watch::channel(None);
        let stats = Arc::new(PipelineStats::default());
        let handle = tokio::spawn(render_loop(rx, surface, status, renderer, Arc::clone(&stats)));
        Self {
            mailbox,
            stats,
            handle,
        }
    }

    /// Offer a payload, replacing any payload not yet rendered.
    pub fn submit(&self, payload: Bytes) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.mailbox.send_replace(Some(payload));
    }

    /// Start a fresh frame-rate window now, so time spent idle before
    /// a stream is not counted against its first window.
    pub fn restart_rate_window(&self) {
        *self
            .stats
            .window_restart
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Payloads offered so far.
    pub fn submitted(&self) -> u64 {
        self.stats.submitted.load(Ordering::Relaxed)
    }

    /// Frames decoded and presented so far.
    pub fn rendered(&self) -> u64 {
        self.stats.rendered.load(Ordering::Relaxed)
    }

    /// Payloads dropped because they failed to decode or present.
    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Stop accepting frames and wait for the task to drain.
    pub async fn shutdown(self) {
        let Self {
            mailbox, handle, ..
        } = self;
        drop(mailbox);
        let _ = handle.await;
    }
}

async fn render_loop(
    mut rx: watch::Receiver<Option<Bytes>>,
    mut surface: Box<dyn OutputSurface>,
    status: Arc<dyn StatusSink>,
    renderer: FrameRenderer,
    stats: Arc<PipelineStats>,
) {
    let mut monitor = ThroughputMonitor::new();

    while rx.changed().await.is_ok() {
        let Some(payload) = rx.borrow_and_update().clone() else {
            continue;
        };
        let display_width = surface.display_width();

        let work = tokio::task::spawn_blocking(move || {
            let result = renderer
                .render(&payload, display_width)
                .and_then(|image| surface.present(&image));
            (surface, result)
        });
        surface = match work.await {
            Ok((returned, Ok(()))) => returned,
            Ok((returned, Err(e))) => {
                warn!("dropping inbound frame: {e}");
                stats.failed.fetch_add(1, Ordering::Relaxed);
                surface = returned;
                continue;
            }
            Err(e) => {
                warn!("render worker failed: {e}");
                stats.failed.fetch_add(1, Ordering::Relaxed);
                break;
            }
        };
        stats.rendered.fetch_add(1, Ordering::Relaxed);

        let restart = stats
            .window_restart
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(at) = restart {
            monitor.reset_at(at);
        }
        if let Some(fps) = monitor.record() {
            status.frame_rate(fps);
        }
    }

    debug!("render pipeline finished");
}

// ── Tests ────────────────────────────────────────────────────────
