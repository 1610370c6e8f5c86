//! Outbound control commands.

use serde::{Deserialize, Serialize};

use crate::error::FlareError;

/// A directive sent to the detector as a UTF-8 JSON text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Start processing a previously uploaded file.
    StartFile {
        /// Name returned by the upload service.
        filename: String,
    },

    /// Binary frames that follow come from a live camera.
    StartWebcam,

    /// Stop the current processing run.
    Stop,
}

impl ControlCommand {
    /// Serialize to the JSON text carried on the wire.
    pub fn to_json(&self) -> Result<String, FlareError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartFile { .. } => "start_file",
            Self::StartWebcam => "start_webcam",
            Self::Stop => "stop",
        }
    }
}
