//! Inbound frame rendering.
//!
//! ## Sub-modules
//!
//! | Module     | Purpose                                             |
//! |------------|-----------------------------------------------------|
//! | `renderer` | Decode + aspect-preserving scale                    |
//! | `surface`  | `OutputSurface` collaborator and an in-memory one   |
//! | `monitor`  | One-second tumbling frame-rate window               |
//! | `pipeline` | Latest-frame-wins render task                       |

pub mod monitor;
pub mod pipeline;
pub mod renderer;
pub mod surface;

pub use monitor::ThroughputMonitor;
pub use pipeline::RenderPipeline;
pub use renderer::{FrameRenderer, fit_to_width};
pub use surface::{MemorySurface, OutputSurface};
