//! HTTP side of the detector: video upload and one-shot image
//! annotation, plus the client-side file checks that guard both.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flare_core::{FlareError, VideoUploader};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv"];
const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "bmp", "tiff"];

const MIB: u64 = 1024 * 1024;

// ── Validation ───────────────────────────────────────────────────

/// Check a video before uploading. Returns its size in bytes.
pub fn validate_video(path: &Path, max_mb: u64) -> Result<u64, FlareError> {
    if !has_extension(path, VIDEO_EXTENSIONS) {
        return Err(FlareError::Upload(
            "Invalid video format. Please select MP4, AVI, MOV, MKV, WMV, or FLV.".into(),
        ));
    }
    let size = file_size(path)?;
    if size > max_mb * MIB {
        return Err(FlareError::Upload(format!(
            "Video file size should be less than {max_mb}MB."
        )));
    }
    Ok(size)
}

/// Check an image before annotating it. Returns its size in bytes.
pub fn validate_image(path: &Path, max_mb: u64) -> Result<u64, FlareError> {
    if !has_extension(path, IMAGE_EXTENSIONS) {
        return Err(FlareError::Upload(
            "Invalid file type. Please upload an image (JPEG, PNG, BMP, TIFF).".into(),
        ));
    }
    let size = file_size(path)?;
    if size > max_mb * MIB {
        return Err(FlareError::Upload(format!(
            "File size too large. Please upload an image smaller than {max_mb}MB."
        )));
    }
    Ok(size)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

fn file_size(path: &Path) -> Result<u64, FlareError> {
    let meta = std::fs::metadata(path)
        .map_err(|e| FlareError::Upload(format!("{}: {e}", path.display())))?;
    if !meta.is_file() {
        return Err(FlareError::Upload(format!("{} is not a file", path.display())));
    }
    Ok(meta.len())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

// ── Replies ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct UploadReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: Option<String>,
}

/// Interpret the `/upload_video` reply: `{success, filename, error}`.
pub fn parse_upload_reply(status: u16, body: &[u8]) -> Result<String, FlareError> {
    let reply: UploadReply = serde_json::from_slice(body).unwrap_or_default();
    match reply {
        UploadReply {
            success: true,
            filename: Some(filename),
            ..
        } if !filename.is_empty() => Ok(filename),
        UploadReply {
            error: Some(error), ..
        } => Err(FlareError::Upload(error)),
        _ if !(200..300).contains(&status) => {
            Err(FlareError::Upload(format!("HTTP error! Status: {status}")))
        }
        _ => Err(FlareError::Upload("Video upload failed at server.".into())),
    }
}

/// Message for a failed request: the server's `error` field when the
/// body is JSON carrying one, otherwise the status code.
pub fn error_from_body(status: u16, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorReply>(body)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or_else(|| format!("HTTP error! Status: {status}"))
}

// ── DetectorHttp ─────────────────────────────────────────────────

/// HTTP client for the detector's upload routes.
#[derive(Debug, Clone)]
pub struct DetectorHttp {
    client: reqwest::Client,
    base: String,
    max_video_mb: u64,
    max_image_mb: u64,
}

impl DetectorHttp {
    pub fn new(
        base: impl Into<String>,
        timeout: Duration,
        max_video_mb: u64,
        max_image_mb: u64,
    ) -> Result<Self, FlareError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlareError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            max_video_mb,
            max_image_mb,
        })
    }

    /// POST a video to `/upload_video`; returns the stored filename.
    pub async fn upload_video(&self, path: &Path) -> Result<String, FlareError> {
        let size = validate_video(path, self.max_video_mb)?;
        info!("uploading {} ({size} bytes)", path.display());

        let form = Form::new().part("videoFile", file_part(path).await?);
        let response = self
            .client
            .post(format!("{}/upload_video", self.base))
            .multipart(form)
            .send()
            .await
            .map_err(|e| FlareError::Upload(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FlareError::Upload(e.to_string()))?;
        debug!("upload reply {status}: {} bytes", body.len());
        parse_upload_reply(status, &body)
    }

    /// POST an image to `/upload_image`; returns the annotated image.
    pub async fn annotate_image(&self, path: &Path) -> Result<Bytes, FlareError> {
        validate_image(path, self.max_image_mb)?;
        info!("annotating {}", path.display());

        let form = Form::new().part("imageFile", file_part(path).await?);
        let response = self
            .client
            .post(format!("{}/upload_image", self.base))
            .multipart(form)
            .send()
            .await
            .map_err(|e| FlareError::Upload(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FlareError::Upload(e.to_string()))?;
        if !status.is_success() {
            return Err(FlareError::Upload(error_from_body(status.as_u16(), &body)));
        }
        Ok(body)
    }
}

#[async_trait]
impl VideoUploader for DetectorHttp {
    async fn upload(&self, file: &Path) -> Result<String, FlareError> {
        self.upload_video(file).await
    }
}

async fn file_part(path: &Path) -> Result<Part, FlareError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| FlareError::Upload(format!("{}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".into());
    Part::bytes(data)
        .file_name(name)
        .mime_str(mime_for(path))
        .map_err(|e| FlareError::Upload(e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn file_of(dir: &tempfile::TempDir, name: &str, len: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn video_extensions_are_checked_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(validate_video(&file_of(&dir, "clip.MP4", 10), 200).unwrap(), 10);
        assert!(validate_video(&file_of(&dir, "clip.mkv", 10), 200).is_ok());
        let err = validate_video(&file_of(&dir, "clip.gif", 10), 200).unwrap_err();
        assert!(err.to_string().contains("Invalid video format"));
    }

    #[test]
    fn oversized_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = file_of(&dir, "big.png", (MIB + 1) as usize);
        assert!(validate_image(&big, 1).is_err());
        assert!(validate_image(&big, 2).is_ok());
    }

    #[test]
    fn missing_file_is_an_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_image(&dir.path().join("nope.jpg"), 15).unwrap_err();
        assert!(matches!(err, FlareError::Upload(_)));
    }

    #[test]
    fn upload_reply_success() {
        let body = br#"{"success": true, "filename": "fire_01.mp4"}"#;
        assert_eq!(parse_upload_reply(200, body).unwrap(), "fire_01.mp4");
    }

    #[test]
    fn upload_reply_errors() {
        let err = parse_upload_reply(400, br#"{"success": false, "error": "No file uploaded"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "upload failed: No file uploaded");

        let err = parse_upload_reply(500, b"Internal Server Error").unwrap_err();
        assert!(err.to_string().contains("Status: 500"));

        let err = parse_upload_reply(200, br#"{"stream_url": "/video_feed"}"#).unwrap_err();
        assert!(err.to_string().contains("failed at server"));
    }

    #[test]
    fn error_body_prefers_server_message() {
        assert_eq!(error_from_body(400, br#"{"error": "Image decode failed"}"#), "Image decode failed");
        assert_eq!(error_from_body(400, b"Image decode failed"), "HTTP error! Status: 400");
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for(Path::new("a.MOV")), "video/quicktime");
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }
}
