//! Decoding and scaling of inbound annotated frames.

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::error::FlareError;

/// Size of a `width × height` frame scaled to `display_width`,
/// preserving aspect ratio. A `display_width` of `0` keeps the native
/// size.
pub fn fit_to_width(width: u32, height: u32, display_width: u32) -> (u32, u32) {
    if display_width == 0 || width == 0 {
        return (width, height);
    }
    let scaled = (height as f64 * display_width as f64 / width as f64).round() as u32;
    (display_width, scaled.max(1))
}

// ── FrameRenderer ────────────────────────────────────────────────

/// Stateless decoder/scaler for compressed-image payloads.
#[derive(Debug, Clone, Copy)]
pub struct FrameRenderer {
    filter: FilterType,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Decode `payload` (any format `image` recognizes; the detector
    /// sends JPEG) and scale it to `display_width`.
    pub fn render(&self, payload: &[u8], display_width: u32) -> Result<RgbaImage, FlareError> {
        if payload.is_empty() {
            return Err(FlareError::Decode("empty frame payload".into()));
        }
        let decoded = image::load_from_memory(payload)
            .map_err(|e| FlareError::Decode(e.to_string()))?
            .to_rgba8();

        let (w, h) = fit_to_width(decoded.width(), decoded.height(), display_width);
        if (w, h) == decoded.dimensions() {
            return Ok(decoded);
        }
        Ok(imageops::resize(&decoded, w, h, self.filter))
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::jpeg_of_size;

    #[test]
    fn fit_preserves_aspect_ratio() {
        assert_eq!(fit_to_width(640, 480, 320), (320, 240));
        assert_eq!(fit_to_width(1920, 1080, 1000), (1000, 563));
        assert_eq!(fit_to_width(100, 300, 50), (50, 150));
    }

    #[test]
    fn zero_display_width_is_native() {
        assert_eq!(fit_to_width(640, 480, 0), (640, 480));
    }

    #[test]
    fn renders_scaled_frame() {
        let jpeg = jpeg_of_size(64, 48);
        let image = FrameRenderer::new().render(&jpeg, 32).unwrap();
        assert_eq!(image.dimensions(), (32, 24));
    }

    #[test]
    fn renders_native_frame() {
        let jpeg = jpeg_of_size(30, 20);
        let image = FrameRenderer::new().render(&jpeg, 0).unwrap();
        assert_eq!(image.dimensions(), (30, 20));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let result = FrameRenderer::new().render(b"not an image", 100);
        assert!(matches!(result, Err(FlareError::Decode(_))));
        assert!(matches!(FrameRenderer::new().render(&[], 100), Err(FlareError::Decode(_))));
    }
}
