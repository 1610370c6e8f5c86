//! Domain-specific error types for the flare streaming core.
//!
//! Every failure is handled by the component that detects it; the
//! variants are grouped by where they originate so callers can decide
//! between a transient skip and a forced return to idle.

use thiserror::Error;

use crate::state::SessionMode;

/// The canonical error type for the flare core.
#[derive(Debug, Error)]
pub enum FlareError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The websocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A send was attempted while the channel was not open.
    #[error("channel not open")]
    ChannelNotOpen,

    /// An mpsc channel or the remote peer went away.
    #[error("channel closed")]
    ChannelClosed,

    // ── Protocol Errors ──────────────────────────────────────────
    /// An inbound text frame could not be parsed as a status message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A state transition was requested from a state that forbids it.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Session Errors ───────────────────────────────────────────
    /// A start request arrived while another session is active.
    #[error("another video or webcam stream is currently active ({0})")]
    SessionBusy(SessionMode),

    /// A start request arrived while an earlier one is still waiting
    /// for the channel to open.
    #[error("a start request is already waiting for the connection")]
    StartPending,

    /// A stop request arrived while nothing is streaming.
    #[error("no streaming session to stop ({0})")]
    NotStreaming(SessionMode),

    // ── Capture Errors ───────────────────────────────────────────
    /// The live media source could not be acquired.
    #[error("media source unavailable: {0}")]
    MediaUnavailable(String),

    /// Grabbing a single frame failed.
    #[error("frame capture failed: {0}")]
    Capture(String),

    /// Encoding a captured frame failed.
    #[error("frame encode failed: {0}")]
    Encode(String),

    // ── Render Errors ────────────────────────────────────────────
    /// An inbound frame payload could not be decoded.
    #[error("frame decode failed: {0}")]
    Decode(String),

    /// The output surface rejected a frame.
    #[error("render failed: {0}")]
    Render(String),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The video upload service reported a failure.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for FlareError {
    fn from(s: String) -> Self {
        FlareError::Other(s)
    }
}

impl From<&str> for FlareError {
    fn from(s: &str) -> Self {
        FlareError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FlareError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FlareError::ChannelClosed
    }
}

impl From<serde_json::Error> for FlareError {
    fn from(e: serde_json::Error) -> Self {
        FlareError::MalformedMessage(e.to_string())
    }
}

impl From<image::ImageError> for FlareError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(_) => FlareError::Encode(e.to_string()),
            other => FlareError::Decode(other.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FlareError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => FlareError::ChannelClosed,
            WsError::Io(io) => FlareError::Connection(io),
            other => FlareError::WebSocket(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = FlareError::SessionBusy(SessionMode::StreamingWebcam);
        assert!(e.to_string().contains("currently active"));
        assert!(e.to_string().contains("StreamingWebcam"));

        let e = FlareError::MediaUnavailable("permission denied".into());
        assert!(e.to_string().contains("permission denied"));
    }

    #[test]
    fn from_string() {
        let e: FlareError = "something broke".into();
        assert!(matches!(e, FlareError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: FlareError = io_err.into();
        assert!(matches!(e, FlareError::Connection(_)));
    }

    #[test]
    fn from_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: FlareError = err.into();
        assert!(matches!(e, FlareError::MalformedMessage(_)));
    }
}
