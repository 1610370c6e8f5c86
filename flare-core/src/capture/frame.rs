//! Raw frames produced by a live media source.
//!
//! A [`CapturedFrame`] lives for exactly one capture tick: it is handed
//! to the encoder and dropped. It is never queued or persisted.

use std::time::Instant;

use crate::error::FlareError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── CapturedFrame ────────────────────────────────────────────────

/// One raw image sampled from a media source.
///
/// The `data` buffer holds `height` rows of `stride` bytes each;
/// `stride` may exceed `width * bytes_per_pixel` when rows are padded.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// A tightly packed frame (`stride == width * bpp`).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel() as u32,
            format,
            data,
            timestamp: Instant::now(),
        }
    }

    /// Check that the buffer is large enough for the declared geometry.
    pub fn validate(&self) -> Result<(), FlareError> {
        if self.width == 0 || self.height == 0 {
            return Err(FlareError::Capture(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let row_len = self.width as usize * self.format.bytes_per_pixel();
        if (self.stride as usize) < row_len {
            return Err(FlareError::Capture(format!(
                "stride {} shorter than row of {row_len} bytes",
                self.stride
            )));
        }
        if self.data.len() < self.stride as usize * self.height as usize {
            return Err(FlareError::Capture(format!(
                "buffer of {} bytes too small for {}x{} (stride {})",
                self.data.len(),
                self.width,
                self.height,
                self.stride
            )));
        }
        Ok(())
    }

    /// Tightly packed RGB copy of the pixels, dropping any alpha and
    /// row padding.
    pub fn to_rgb(&self) -> Result<Vec<u8>, FlareError> {
        self.validate()?;
        let bpp = self.format.bytes_per_pixel();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);

        for y in 0..self.height as usize {
            let start = y * self.stride as usize;
            let row = &self.data[start..start + self.width as usize * bpp];
            match self.format {
                PixelFormat::Rgb8 => out.extend_from_slice(row),
                PixelFormat::Rgba8 => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&px[..3]);
                    }
                }
                PixelFormat::Bgra8 => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
            }
        }

        Ok(out)
    }
}

// ── Tests ────────────────────────────────────────────────────────
