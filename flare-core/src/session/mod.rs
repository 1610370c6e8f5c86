//! Streaming session: state machine, event loop and handle.
//!
//! ## Sub-modules
//!
//! | Module    | Purpose                                              |
//! |-----------|------------------------------------------------------|
//! | `config`  | Tunables (delays, cadence, quality, queue depths)    |
//! | `event`   | Typed inputs to the dispatch loop                    |
//! | `machine` | `StreamingSession`, the single owner of the mode     |
//! | `handle`  | Cloneable `SessionHandle` for user intents           |

pub mod config;
pub mod event;
pub mod handle;
pub mod machine;

pub use config::SessionConfig;
pub use event::{Admission, IntentReply, SessionEvent, UserIntent};
pub use handle::SessionHandle;
pub use machine::{Collaborators, StreamingSession};
