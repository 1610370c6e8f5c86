//! Typed events consumed by the session dispatch loop.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::FlareError;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    /// Upload a video file and stream the detector's annotated output.
    StartVideo(PathBuf),
    /// Stream the live camera to the detector.
    StartWebcam,
    /// Stop whatever is streaming.
    Stop,
}

impl UserIntent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartVideo(_) => "start-video",
            Self::StartWebcam => "start-webcam",
            Self::Stop => "stop",
        }
    }
}

/// How a user intent was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The session is starting (upload in progress or streaming).
    Started,
    /// The channel was not open; the request will be replayed once
    /// when it opens, or dropped if it does not open in time.
    Deferred,
    /// The active session was stopped.
    Stopped,
}

/// Reply slot for a user intent.
pub type IntentReply = oneshot::Sender<Result<Admission, FlareError>>;

/// Every input to the session state machine.
///
/// Channel events carry the generation of the channel instance that
/// produced them; events from a replaced instance are ignored.
#[derive(Debug)]
pub enum SessionEvent {
    /// The connection attempt of `generation` succeeded.
    ChannelOpened { generation: u64 },

    /// The channel of `generation` failed to connect, errored, or was
    /// closed by the peer.
    ChannelClosed { generation: u64, reason: String },

    /// A text frame arrived.
    TextMessage { generation: u64, text: String },

    /// A binary frame arrived.
    BinaryMessage { generation: u64, payload: Bytes },

    /// A request from the user.
    UserIntent {
        intent: UserIntent,
        reply: Option<IntentReply>,
    },

    /// The upload collaborator finished the upload identified by `ticket`.
    UploadFinished {
        ticket: u64,
        result: Result<String, FlareError>,
    },

    /// The deferred intent identified by `ticket` ran out of time.
    PendingExpired { ticket: u64 },

    /// The reconnection delay scheduled when instance `generation` was
    /// lost has elapsed.
    ReconnectDue { generation: u64 },

    /// Stop any session, close the channel and end the loop.
    Shutdown,
}

impl SessionEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelOpened { .. } => "channel-opened",
            Self::ChannelClosed { .. } => "channel-closed",
            Self::TextMessage { .. } => "text-message",
            Self::BinaryMessage { .. } => "binary-message",
            Self::UserIntent { .. } => "user-intent",
            Self::UploadFinished { .. } => "upload-finished",
            Self::PendingExpired { .. } => "pending-expired",
            Self::ReconnectDue { .. } => "reconnect-due",
            Self::Shutdown => "shutdown",
        }
    }
}
