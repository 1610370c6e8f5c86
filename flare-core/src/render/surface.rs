//! Output surfaces that rendered frames are painted onto.

use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;

use crate::error::FlareError;

/// Where rendered frames end up (a window, a file, a buffer).
pub trait OutputSurface: Send {
    /// Target width in pixels; `0` means "use the frame's own width".
    fn display_width(&self) -> u32;

    /// Paint one frame, replacing whatever was shown before.
    fn present(&mut self, image: &RgbaImage) -> Result<(), FlareError>;
}

// ── MemorySurface ────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    latest: Option<RgbaImage>,
    presented: u64,
}

/// Keeps the most recent frame in memory. Clones share the same
/// buffer, so one clone can be handed to the renderer and another kept
/// for inspection.
#[derive(Clone, Default)]
pub struct MemorySurface {
    display_width: u32,
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySurface {
    pub fn new(display_width: u32) -> Self {
        Self {
            display_width,
            inner: Arc::default(),
        }
    }

    /// The last presented frame.
    pub fn latest(&self) -> Option<RgbaImage> {
        self.lock().latest.clone()
    }

    /// Number of frames presented so far.
    pub fn presented(&self) -> u64 {
        self.lock().presented
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSurface for MemorySurface {
    fn display_width(&self) -> u32 {
        self.display_width
    }

    fn present(&mut self, image: &RgbaImage) -> Result<(), FlareError> {
        let mut inner = self.lock();
        inner.latest = Some(image.clone());
        inner.presented += 1;
        Ok(())
    }
}
