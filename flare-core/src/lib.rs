//! # flare-core
//!
//! Real-time streaming session manager for the flare detector client.
//!
//! This crate contains:
//! - **Protocol**: `ControlCommand` and `StatusMessage`, the JSON control traffic
//! - **State**: `SessionMode` and `ChannelState` transition rules
//! - **Transport**: `TransportChannel` over a pluggable `Connector` (websocket or in-memory)
//! - **Capture**: webcam `CapturePump`, JPEG `FrameEncoder`, media collaborator traits
//! - **Render**: latest-frame-wins `RenderPipeline` and `ThroughputMonitor`
//! - **Session**: `StreamingSession` event loop and its `SessionHandle`
//! - **Error**: `FlareError`, a `thiserror`-based error hierarchy

pub mod capture;
pub mod error;
pub mod protocol;
pub mod render;
pub mod session;
pub mod state;
pub mod status;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{
    CaptureConstraints, CapturePump, CapturedFrame, FrameEncoder, MediaProvider, MediaSource,
    PixelFormat, PumpConfig,
};
pub use error::FlareError;
pub use protocol::{ControlCommand, DetectionCounts, StatusLevel, StatusMessage};
pub use render::{FrameRenderer, MemorySurface, OutputSurface, RenderPipeline, ThroughputMonitor};
pub use session::{
    Admission, Collaborators, SessionConfig, SessionEvent, SessionHandle, StreamingSession,
    UserIntent,
};
pub use state::{ChannelState, SessionMode};
pub use status::{ConnectionIndicator, RecordingSink, StatusSink, StatusUpdate};
pub use transport::{
    ChannelConfig, ChannelLink, Connector, MemoryConnector, MemoryPeer, TransportChannel,
    WireMessage, WsConnector,
};
pub use upload::VideoUploader;
