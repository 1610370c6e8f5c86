//! Media sources available to the command-line client.
//!
//! `capture.source` in the config picks one:
//!
//! - `"camera"`: a V4L2 device through `CameraProvider` (Linux, built
//!   with the `camera-v4l2` feature).
//! - `"pattern"`: [`PatternProvider`], a synthetic moving test pattern.
//! - `"directory"`: [`DirectoryProvider`], replays the JPEG/PNG files of
//!   a directory in name order, looping forever.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use flare_core::{
    CaptureConstraints, CapturedFrame, FlareError, MediaProvider, MediaSource, PixelFormat,
};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;

#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
mod camera;
#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
pub use camera::{CameraProvider, CameraSource};

/// Build the provider named by `capture.source`.
pub fn provider_for(capture: &CaptureConfig) -> Arc<dyn MediaProvider> {
    match capture.source.as_str() {
        "camera" => camera_provider(&capture.device),
        "directory" => Arc::new(DirectoryProvider::new(&capture.directory)),
        "pattern" => Arc::new(PatternProvider),
        other => {
            warn!("unknown capture source {other:?}; using test pattern");
            Arc::new(PatternProvider)
        }
    }
}

#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
fn camera_provider(device: &str) -> Arc<dyn MediaProvider> {
    Arc::new(CameraProvider::new(device))
}

#[cfg(not(all(feature = "camera-v4l2", target_os = "linux")))]
fn camera_provider(device: &str) -> Arc<dyn MediaProvider> {
    Arc::new(UnavailableProvider::new(format!(
        "{device}: camera support not built; rebuild on Linux with --features camera-v4l2"
    )))
}

// ── Unavailable ──────────────────────────────────────────────────

/// Refuses every acquisition with a fixed reason.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MediaProvider for UnavailableProvider {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaSource>, FlareError> {
        Err(FlareError::MediaUnavailable(self.reason.clone()))
    }
}

// ── Test pattern ─────────────────────────────────────────────────

/// Provides [`PatternSource`]s sized to the requested constraints.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternProvider;

#[async_trait]
impl MediaProvider for PatternProvider {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaSource>, FlareError> {
        info!(
            "test pattern source {}x{}",
            constraints.ideal_width, constraints.ideal_height
        );
        Ok(Arc::new(PatternSource::new(
            constraints.ideal_width,
            constraints.ideal_height,
        )))
    }
}

/// Diagonal colour bands that shift by a few pixels every frame.
pub struct PatternSource {
    width: u32,
    height: u32,
    frame: AtomicU64,
    released: AtomicBool,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: AtomicU64::new(0),
            released: AtomicBool::new(false),
        }
    }

    fn render(&self, n: u64) -> Vec<u8> {
        let shift = (n * 4) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let band = ((x + y + shift) / 32) % 3;
                let level = ((x + shift) % 256) as u8;
                let px = match band {
                    0 => [level, 40, 40],
                    1 => [40, level, 40],
                    _ => [40, 40, level],
                };
                data.extend_from_slice(&px);
            }
        }
        data
    }
}

#[async_trait]
impl MediaSource for PatternSource {
    async fn grab(&self) -> Result<CapturedFrame, FlareError> {
        if self.is_released() {
            return Err(FlareError::Capture("source released".into()));
        }
        let n = self.frame.fetch_add(1, Ordering::Relaxed);
        Ok(CapturedFrame::packed(
            self.width,
            self.height,
            PixelFormat::Rgb8,
            self.render(n),
        ))
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!("test pattern released");
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

// ── Directory replay ─────────────────────────────────────────────

const REPLAY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Provides [`DirectorySource`]s over the images in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MediaProvider for DirectoryProvider {
    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaSource>, FlareError> {
        let frames = list_images(&self.dir)?;
        info!("replaying {} images from {}", frames.len(), self.dir.display());
        Ok(Arc::new(DirectorySource::new(frames)))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, FlareError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| FlareError::MediaUnavailable(format!("{}: {e}", dir.display())))?;
    let mut frames: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| REPLAY_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        })
        .collect();
    if frames.is_empty() {
        return Err(FlareError::MediaUnavailable(format!(
            "no JPEG or PNG images in {}",
            dir.display()
        )));
    }
    frames.sort();
    Ok(frames)
}

/// Loops over a fixed list of image files.
pub struct DirectorySource {
    frames: Vec<PathBuf>,
    next: AtomicU64,
    released: AtomicBool,
}

impl DirectorySource {
    pub fn new(frames: Vec<PathBuf>) -> Self {
        Self {
            frames,
            next: AtomicU64::new(0),
            released: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MediaSource for DirectorySource {
    async fn grab(&self) -> Result<CapturedFrame, FlareError> {
        if self.is_released() {
            return Err(FlareError::Capture("source released".into()));
        }
        if self.frames.is_empty() {
            return Err(FlareError::Capture("no frames to replay".into()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) as usize % self.frames.len();
        let path = self.frames[index].clone();

        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| FlareError::Capture(e.to_string()))?
            .map_err(|e| FlareError::Capture(e.to_string()))?
            .to_rgb8();

        let (width, height) = image.dimensions();
        Ok(CapturedFrame::packed(
            width,
            height,
            PixelFormat::Rgb8,
            image.into_raw(),
        ))
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!("directory replay released");
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

// ── Tests ────────────────────────────────────────────────────────
