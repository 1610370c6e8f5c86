//! Live media source collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capture::frame::CapturedFrame;
use crate::error::FlareError;

/// Requested capture geometry and rate. Sources treat these as ideals
/// and may deliver something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_fps: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            ideal_fps: 15,
        }
    }
}

/// An acquired live source, e.g. a camera.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Grab the most recent frame.
    async fn grab(&self) -> Result<CapturedFrame, FlareError>;

    /// Stop the source and free the device. Idempotent.
    fn release(&self);

    fn is_released(&self) -> bool;
}

/// Grants access to a live source.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Acquire a source. Errors carry the reason verbatim (e.g. a
    /// permission denial) so it can be shown to the user.
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaSource>, FlareError>;
}
