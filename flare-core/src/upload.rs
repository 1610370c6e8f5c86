//! Video upload collaborator.

use std::path::Path;

use async_trait::async_trait;

use crate::error::FlareError;

/// Hands a local video file to the detector host before streaming.
#[async_trait]
pub trait VideoUploader: Send + Sync {
    /// Upload `file` and return the name the detector stored it under.
    /// That name goes into the `start_file` command.
    async fn upload(&self, file: &Path) -> Result<String, FlareError>;
}
