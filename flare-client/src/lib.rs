//! # flare-client
//!
//! Command-line front end for the flare detector: streams a camera
//! stand-in or an uploaded video through `flare-core` and writes the
//! annotated frames to disk.

pub mod config;
pub mod http;
pub mod media;
pub mod sink;
pub mod surface;
