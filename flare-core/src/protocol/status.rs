//! Inbound status messages.
//!
//! The detector reports progress as `{"status": "...", "message": "..."}`.
//! A few phrases mark the end of a processing run and error severity
//! ends the session; both are recognised here so the session machine
//! only deals with typed predicates.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::FlareError;

/// Phrases (lower-case) that signal server-driven completion.
const TERMINAL_PHRASES: &[&str] = &[
    "finished video processing",
    "finished processing",
    "processing stopped",
];

static FIRE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)fire:\s*(\d+)").expect("static regex"));
static SMOKE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)smoke:\s*(\d+)").expect("static regex"));

// ── StatusLevel ──────────────────────────────────────────────────

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
    /// Missing or unrecognised severity. Not shown to the user.
    Other,
}

impl StatusLevel {
    fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some("info") => Self::Info,
            Some("warning") => Self::Warning,
            Some("error") => Self::Error,
            _ => Self::Other,
        }
    }

    fn as_wire(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

// ── StatusMessage ────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A parsed status report from the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub message: String,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Parse an inbound text frame.
    ///
    /// Anything that is not a JSON object is a protocol error.
    pub fn parse(text: &str) -> Result<Self, FlareError> {
        let raw: RawStatus = serde_json::from_str(text)?;
        Ok(Self {
            level: StatusLevel::from_wire(raw.status.as_deref()),
            message: raw.message.unwrap_or_default(),
        })
    }

    /// Serialize to the wire format. Used by detector-side fixtures.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "status": self.level.as_wire(), "message": self.message }).to_string()
    }

    /// Whether the message should be surfaced to the status sink.
    pub fn is_reportable(&self) -> bool {
        !matches!(self.level, StatusLevel::Other)
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }

    /// Whether the message announces the end of the processing run.
    pub fn is_terminal(&self) -> bool {
        let lower = self.message.to_lowercase();
        TERMINAL_PHRASES.iter().any(|p| lower.contains(p))
    }

    /// Detection tallies embedded in the message, if any.
    pub fn detection_counts(&self) -> Option<DetectionCounts> {
        DetectionCounts::parse(&self.message)
    }
}

// ── DetectionCounts ──────────────────────────────────────────────

/// Fire / smoke tallies reported inside status text (`Fire: 2, Smoke: 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionCounts {
    pub fire: Option<u32>,
    pub smoke: Option<u32>,
}

impl DetectionCounts {
    /// Extract tallies from free text. `None` when neither is present.
    pub fn parse(text: &str) -> Option<Self> {
        let grab = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        };
        let counts = Self {
            fire: grab(&FIRE_COUNT),
            smoke: grab(&SMOKE_COUNT),
        };
        (counts.fire.is_some() || counts.smoke.is_some()).then_some(counts)
    }
}

// ── Tests ────────────────────────────────────────────────────────
