//! Control and status messages exchanged with the detector.
//!
//! # Wire Protocol
//!
//! All traffic shares the single websocket at `/video_feed`.
//!
//! ```text
//! Client ──[text: {"command":"start_file","filename":"…"}]──► Detector
//! Client ──[text: {"command":"start_webcam"}]───────────────► Detector
//! Client ──[binary: JPEG bytes]─────────────────────────────► Detector  (repeated)
//! Client ──[text: {"command":"stop"}]───────────────────────► Detector
//!
//! Detector ──[text: {"status":"info","message":"…"}]────────► Client
//! Detector ──[binary: annotated JPEG bytes]─────────────────► Client    (repeated)
//! ```
//!
//! Messages carry no identifiers or sequence numbers; status lines are
//! not correlated with specific frames.

pub mod command;
pub mod status;

pub use command::ControlCommand;
pub use status::{DetectionCounts, StatusLevel, StatusMessage};
