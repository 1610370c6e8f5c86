//! Session mode state machine.
//!
//! `SessionMode` is the single source of truth for which streaming
//! activity owns the channel. Transitions are validated and return
//! `Result` instead of panicking; the only unconditional transition is
//! [`SessionMode::force_idle`].

use crate::error::FlareError;

// ── SessionMode ──────────────────────────────────────────────────

/// The streaming activity currently permitted to use the channel.
///
/// ```text
///  Idle ──► UploadingVideo ──► StreamingVideo ──► Idle
///   │                                              ▲
///   └────────────► StreamingWebcam ────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionMode {
    /// Nothing is streaming. Initial / terminal state.
    #[default]
    Idle,

    /// A video file is being handed to the upload service.
    UploadingVideo,

    /// The detector is processing an uploaded file and streaming
    /// annotated frames back.
    StreamingVideo,

    /// Local camera frames are pumped to the detector.
    StreamingWebcam,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::UploadingVideo => write!(f, "UploadingVideo"),
            Self::StreamingVideo => write!(f, "StreamingVideo"),
            Self::StreamingWebcam => write!(f, "StreamingWebcam"),
        }
    }
}

impl SessionMode {
    /// Returns `true` when no session is active.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` for every mode except `Idle`.
    pub fn is_active(&self) -> bool {
        !self.is_idle()
    }

    /// Returns `true` when frames are flowing (video or webcam).
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::StreamingVideo | Self::StreamingWebcam)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `UploadingVideo`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_upload(&mut self) -> Result<(), FlareError> {
        match self {
            Self::Idle => {
                *self = Self::UploadingVideo;
                Ok(())
            }
            other => Err(FlareError::SessionBusy(*other)),
        }
    }

    /// Transition to `StreamingVideo` once the upload was acknowledged.
    ///
    /// Valid from: `UploadingVideo`.
    pub fn begin_video_stream(&mut self) -> Result<(), FlareError> {
        match self {
            Self::UploadingVideo => {
                *self = Self::StreamingVideo;
                Ok(())
            }
            _ => Err(FlareError::InvalidTransition(
                "cannot stream video: not in UploadingVideo state",
            )),
        }
    }

    /// Transition to `StreamingWebcam`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_webcam_stream(&mut self) -> Result<(), FlareError> {
        match self {
            Self::Idle => {
                *self = Self::StreamingWebcam;
                Ok(())
            }
            other => Err(FlareError::SessionBusy(*other)),
        }
    }

    /// Transition back to `Idle` at the user's request.
    ///
    /// Valid from: `StreamingVideo`, `StreamingWebcam`. Returns the
    /// mode that was left.
    pub fn end(&mut self) -> Result<SessionMode, FlareError> {
        match self {
            Self::StreamingVideo | Self::StreamingWebcam => Ok(std::mem::take(self)),
            other => Err(FlareError::NotStreaming(*other)),
        }
    }

    /// Force-reset to `Idle` regardless of current state and return the
    /// mode that was left.
    ///
    /// Used for server-driven completion, server errors and channel loss.
    pub fn force_idle(&mut self) -> SessionMode {
        std::mem::take(self)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn video_lifecycle() {
        let mut mode = SessionMode::Idle;

        assert_ok!(mode.begin_upload());
        assert_eq!(mode, SessionMode::UploadingVideo);
        assert!(mode.is_active());
        assert!(!mode.is_streaming());

        assert_ok!(mode.begin_video_stream());
        assert_eq!(mode, SessionMode::StreamingVideo);

        assert_eq!(mode.end().unwrap(), SessionMode::StreamingVideo);
        assert!(mode.is_idle());
    }

    #[test]
    fn webcam_lifecycle() {
        let mut mode = SessionMode::default();
        assert_ok!(mode.begin_webcam_stream());
        assert!(mode.is_streaming());
        assert_eq!(mode.end().unwrap(), SessionMode::StreamingWebcam);
        assert!(mode.is_idle());
    }

    #[test]
    fn start_rejected_while_active() {
        for active in [
            SessionMode::UploadingVideo,
            SessionMode::StreamingVideo,
            SessionMode::StreamingWebcam,
        ] {
            let mut mode = active;
            assert!(matches!(mode.begin_upload(), Err(FlareError::SessionBusy(m)) if m == active));
            assert!(matches!(mode.begin_webcam_stream(), Err(FlareError::SessionBusy(_))));
            assert_eq!(mode, active);
        }
    }

    #[test]
    fn video_stream_requires_upload() {
        let mut mode = SessionMode::Idle;
        assert_err!(mode.begin_video_stream());
        assert!(mode.is_idle());
    }

    #[test]
    fn end_rejected_when_not_streaming() {
        let mut mode = SessionMode::Idle;
        assert!(matches!(mode.end(), Err(FlareError::NotStreaming(SessionMode::Idle))));

        let mut mode = SessionMode::UploadingVideo;
        assert_err!(mode.end());
        assert_eq!(mode, SessionMode::UploadingVideo);
    }

    #[test]
    fn force_idle_from_any_state() {
        let mut mode = SessionMode::UploadingVideo;
        assert_eq!(mode.force_idle(), SessionMode::UploadingVideo);
        assert!(mode.is_idle());

        let mut mode = SessionMode::Idle;
        assert_eq!(mode.force_idle(), SessionMode::Idle);
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionMode::Idle.to_string(), "Idle");
        assert_eq!(SessionMode::StreamingWebcam.to_string(), "StreamingWebcam");
    }
}
