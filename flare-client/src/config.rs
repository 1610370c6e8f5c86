//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use flare_core::{CaptureConstraints, SessionConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Detector server settings.
    pub network: NetworkConfig,
    /// Webcam capture settings.
    pub capture: CaptureConfig,
    /// Output of annotated frames.
    pub render: RenderConfig,
    /// File upload limits.
    pub upload: UploadConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Detector server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Detector address, `host:port`.
    pub server: String,
    /// Use `wss://` / `https://`.
    pub secure: bool,
    /// Websocket path of the streaming endpoint.
    pub feed_path: String,
    /// Delay before reconnecting after the connection drops.
    pub reconnect_delay_ms: u64,
    /// How long a start request waits for the connection.
    pub pending_window_ms: u64,
    /// HTTP request timeout for uploads.
    pub timeout_ms: u64,
}

/// Webcam capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// `"camera"` for a V4L2 device, `"pattern"` for a synthetic test
    /// pattern, `"directory"` to replay the images in `directory`.
    pub source: String,
    /// Camera device node for the camera source.
    pub device: String,
    /// Image directory for the replay source.
    pub directory: PathBuf,
    /// Ideal frame width.
    pub width: u32,
    /// Ideal frame height.
    pub height: u32,
    /// Captures per second.
    pub fps: u32,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
}

/// Output of annotated frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Width frames are scaled to; 0 keeps the native size.
    pub display_width: u32,
    /// File the latest annotated frame is written to.
    pub output: PathBuf,
}

/// File upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted video, in MiB.
    pub max_video_mb: u64,
    /// Largest accepted image, in MiB.
    pub max_image_mb: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (overridden by `RUST_LOG`).
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:5000".into(),
            secure: false,
            feed_path: "/video_feed".into(),
            reconnect_delay_ms: 3000,
            pending_window_ms: 2000,
            timeout_ms: 120_000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: "camera".into(),
            device: "/dev/video0".into(),
            directory: PathBuf::from("frames"),
            width: 640,
            height: 480,
            fps: 15,
            jpeg_quality: 80,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            display_width: 960,
            output: PathBuf::from("latest_frame.jpg"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_video_mb: 200,
            max_image_mb: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    // ── Derived settings ─────────────────────────────────────────

    /// Websocket URL of the streaming endpoint.
    pub fn ws_endpoint(&self) -> String {
        let scheme = if self.network.secure { "wss" } else { "ws" };
        format!("{scheme}://{}{}", self.network.server, self.feed_path())
    }

    /// Base URL for the HTTP upload routes.
    pub fn http_base(&self) -> String {
        let scheme = if self.network.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.network.server)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.network.timeout_ms)
    }

    /// Core session tunables derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        let fps = self.capture.fps.max(1);
        SessionConfig {
            endpoint: self.ws_endpoint(),
            reconnect_delay: Duration::from_millis(self.network.reconnect_delay_ms),
            pending_intent_window: Duration::from_millis(self.network.pending_window_ms),
            capture_interval: Duration::from_millis(1000 / fps as u64),
            jpeg_quality: self.capture.jpeg_quality,
            constraints: CaptureConstraints {
                ideal_width: self.capture.width,
                ideal_height: self.capture.height,
                ideal_fps: fps,
            },
            ..SessionConfig::default()
        }
    }

    fn feed_path(&self) -> String {
        let path = self.network.feed_path.trim();
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
