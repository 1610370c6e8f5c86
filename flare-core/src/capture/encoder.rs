//! JPEG encoding of captured frames.
//!
//! Each [`CapturedFrame`] becomes one self-contained JPEG, sent as one
//! binary message. There is no inter-frame state.

use bytes::Bytes;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

use crate::capture::frame::CapturedFrame;
use crate::error::FlareError;

/// Default JPEG quality (0.8 on the unit scale).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ── FrameEncoder ─────────────────────────────────────────────────

/// Stateless JPEG encoder with a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    /// 1..=100.
    quality: u8,
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one frame. JPEG has no alpha channel, so the pixels are
    /// flattened to RGB first.
    pub fn encode(&self, frame: &CapturedFrame) -> Result<Bytes, FlareError> {
        let rgb = frame.to_rgb()?;
        let mut out = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| FlareError::Encode(e.to_string()))?;
        Ok(Bytes::from(out))
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PixelFormat;

    fn gradient(w: u32, h: u32) -> CapturedFrame {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128, 255]);
            }
        }
        CapturedFrame::packed(w, h, PixelFormat::Rgba8, data)
    }

    #[test]
    fn produces_a_jpeg() {
        let jpeg = FrameEncoder::default().encode(&gradient(64, 48)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn quality_is_clamped_to_jpeg_range() {
        assert_eq!(FrameEncoder::default().quality(), 80);
        assert_eq!(FrameEncoder::new(0).quality(), 1);
        assert_eq!(FrameEncoder::new(250).quality(), 100);
    }

    #[test]
    fn lower_quality_is_smaller() {
        let frame = gradient(64, 64);
        let high = FrameEncoder::new(95).encode(&frame).unwrap();
        let low = FrameEncoder::new(10).encode(&frame).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn invalid_frame_is_an_error() {
        let frame = CapturedFrame::packed(8, 8, PixelFormat::Rgb8, vec![0; 3]);
        assert!(FrameEncoder::default().encode(&frame).is_err());
    }
}
