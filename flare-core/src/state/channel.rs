//! Transport channel lifecycle.
//!
//! Mirrors the readiness states of a websocket: a channel is created
//! `Connecting`, becomes `Open`, and ends `Closed`, optionally passing
//! through `Closing` on a local close.

use std::time::{Duration, Instant};

use crate::error::FlareError;

// ── ChannelState ─────────────────────────────────────────────────

/// The current state of the single duplex channel to the detector.
///
/// ```text
///  Closed ──► Connecting ──► Open
///    ▲            │           │
///    │            ▼           ▼
///    └───────── Closing ◄─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Connection initiated but not yet established.
    Connecting,

    /// Ready for control and frame traffic.
    Open {
        /// When the channel entered the `Open` state.
        since: Instant,
    },

    /// Local close in progress.
    Closing,

    /// No live channel. Initial / terminal state.
    #[default]
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open { .. } => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ChannelState {
    /// Returns `true` when sends are accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` when the channel is open or about to be.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Connecting)
    }

    /// Returns `true` when the channel is fully closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// How long the channel has been open. `None` for any other state.
    pub fn open_duration(&self) -> Option<Duration> {
        match self {
            Self::Open { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Closed`. A prior channel must be fully closed
    /// before it is replaced.
    pub fn begin_connect(&mut self) -> Result<(), FlareError> {
        match self {
            Self::Closed => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(FlareError::InvalidTransition(
                "cannot connect: previous channel not closed",
            )),
        }
    }

    /// Transition to `Open`.
    ///
    /// Valid from: `Connecting`.
    pub fn mark_open(&mut self) -> Result<(), FlareError> {
        match self {
            Self::Connecting => {
                *self = Self::Open {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(FlareError::InvalidTransition(
                "cannot open: not in Connecting state",
            )),
        }
    }

    /// Transition to `Closing`.
    ///
    /// Valid from: `Connecting`, `Open`.
    pub fn begin_close(&mut self) -> Result<(), FlareError> {
        match self {
            Self::Connecting | Self::Open { .. } => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(FlareError::InvalidTransition(
                "cannot close: channel not live",
            )),
        }
    }

    /// Transition to `Closed`.
    ///
    /// Valid from: `Closing`.
    pub fn finish_close(&mut self) -> Result<(), FlareError> {
        match self {
            Self::Closing => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(FlareError::InvalidTransition(
                "cannot finish close: not in Closing state",
            )),
        }
    }

    /// Force-reset to `Closed` regardless of current state.
    ///
    /// Use this when the peer or the network ends the channel.
    pub fn force_closed(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn happy_path_lifecycle() {
        let mut state = ChannelState::Closed;

        assert_ok!(state.begin_connect());
        assert_eq!(state, ChannelState::Connecting);
        assert!(state.is_live());
        assert!(!state.is_open());

        assert_ok!(state.mark_open());
        assert!(state.is_open());
        assert!(state.open_duration().is_some());

        assert_ok!(state.begin_close());
        assert_eq!(state, ChannelState::Closing);

        assert_ok!(state.finish_close());
        assert!(state.is_closed());
    }

    #[test]
    fn connect_requires_closed() {
        let mut state = ChannelState::Connecting;
        assert_err!(state.begin_connect());

        let mut state = ChannelState::Closing;
        assert_err!(state.begin_connect());
    }

    #[test]
    fn open_requires_connecting() {
        let mut state = ChannelState::Closed;
        assert_err!(state.mark_open());
    }

    #[test]
    fn close_from_connecting() {
        let mut state = ChannelState::Connecting;
        assert_ok!(state.begin_close());
        assert_ok!(state.finish_close());
        assert!(state.is_closed());
    }

    #[test]
    fn close_when_closed_is_rejected() {
        let mut state = ChannelState::Closed;
        assert_err!(state.begin_close());
    }

    #[test]
    fn force_closed_from_any_state() {
        let mut state = ChannelState::Open {
            since: Instant::now(),
        };
        state.force_closed();
        assert!(state.is_closed());
    }

    #[test]
    fn default_state_is_closed() {
        assert!(ChannelState::default().is_closed());
        assert_eq!(ChannelState::default().to_string(), "Closed");
    }
}
