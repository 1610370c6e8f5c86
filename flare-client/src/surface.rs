//! File-backed output surface.

use std::path::{Path, PathBuf};

use flare_core::{FlareError, OutputSurface};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::debug;

/// Writes each presented frame to a file, replacing the previous one.
///
/// The frame goes to a sibling temp file first and is renamed into
/// place, so a viewer polling the file never sees a half-written image.
pub struct SnapshotSurface {
    path: PathBuf,
    display_width: u32,
    format: ImageFormat,
    written: u64,
}

impl SnapshotSurface {
    /// The image format is picked from the file extension (JPEG when
    /// unknown).
    pub fn new(path: impl Into<PathBuf>, display_width: u32) -> Self {
        let path = path.into();
        let format = match ImageFormat::from_path(&path) {
            Ok(ImageFormat::Png) => ImageFormat::Png,
            _ => ImageFormat::Jpeg,
        };
        Self {
            path,
            display_width,
            format,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "frame".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl OutputSurface for SnapshotSurface {
    fn display_width(&self) -> u32 {
        self.display_width
    }

    fn present(&mut self, image: &RgbaImage) -> Result<(), FlareError> {
        let tmp = self.temp_path();
        save_with_format(image, &tmp, self.format)?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| FlareError::Render(format!("{}: {e}", self.path.display())))?;
        self.written += 1;
        debug!(
            "frame {} written to {} ({}x{})",
            self.written,
            self.path.display(),
            image.width(),
            image.height()
        );
        Ok(())
    }
}

/// Save an RGBA frame. JPEG has no alpha channel, so it is dropped.
pub fn save_with_format(
    image: &RgbaImage,
    path: &Path,
    format: ImageFormat,
) -> Result<(), FlareError> {
    let result = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(path, format),
        _ => image.save_with_format(path, format),
    };
    result.map_err(|e| FlareError::Render(format!("{}: {e}", path.display())))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn present_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.jpg");
        let mut surface = SnapshotSurface::new(&path, 320);
        assert_eq!(surface.display_width(), 320);

        surface
            .present(&RgbaImage::from_pixel(8, 4, Rgba([200, 0, 0, 255])))
            .unwrap();
        surface
            .present(&RgbaImage::from_pixel(6, 3, Rgba([0, 200, 0, 255])))
            .unwrap();

        assert_eq!(surface.written(), 2);
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (6, 3));
        assert!(!surface.temp_path().exists());
    }

    #[test]
    fn png_keeps_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.png");
        let mut surface = SnapshotSurface::new(&path, 0);
        surface
            .present(&RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 128])))
            .unwrap();

        let saved = image::open(&path).unwrap().to_rgba8();
        assert_eq!(saved.get_pixel(0, 0), &Rgba([1, 2, 3, 128]));
    }

    #[test]
    fn unwritable_path_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = SnapshotSurface::new(dir.path().join("missing/latest.jpg"), 0);
        let err = surface.present(&RgbaImage::new(2, 2)).unwrap_err();
        assert!(matches!(err, FlareError::Render(_)));
    }
}
