//! Outbound webcam pipeline.
//!
//! ```text
//!  MediaSource ──grab──► CapturedFrame ──FrameEncoder──► JPEG ──► ChannelLink
//!       ▲                                                              │
//!       └─────────────────── CapturePump (one tick / interval) ────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module    | Purpose                                        |
//! |-----------|------------------------------------------------|
//! | `frame`   | Raw frame and pixel layout types               |
//! | `encoder` | JPEG encoding at a fixed quality               |
//! | `source`  | `MediaProvider` / `MediaSource` collaborators  |
//! | `pump`    | Cancellable periodic capture task              |

pub mod encoder;
pub mod frame;
pub mod pump;
pub mod source;

pub use encoder::{DEFAULT_JPEG_QUALITY, FrameEncoder};
pub use frame::{CapturedFrame, PixelFormat};
pub use pump::{CapturePump, PumpConfig, PumpExit};
pub use source::{CaptureConstraints, MediaProvider, MediaSource};
