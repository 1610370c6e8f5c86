//! Duplex message transport to the detector.
//!
//! ## Sub-modules
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `channel`   | Single-channel lifecycle, send policy, reconnection  |
//! | `websocket` | `tokio-tungstenite` connector for the live endpoint  |
//! | `memory`    | In-process loopback connector                        |
//!
//! A [`Connector`] turns an endpoint into a split sink/stream pair of
//! [`WireMessage`]s; everything above it is transport-agnostic.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, Stream};

use crate::error::FlareError;

pub mod channel;
pub mod memory;
pub mod websocket;

pub use channel::{ChannelConfig, ChannelLink, TransportChannel};
pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WsConnector;

// ── WireMessage ──────────────────────────────────────────────────

/// One message on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// UTF-8 JSON control or status message.
    Text(String),
    /// Raw compressed-image bytes, one frame per message.
    Binary(Bytes),
    /// The peer is closing the channel, with an optional reason.
    Close(Option<String>),
}

impl WireMessage {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
            Self::Close(_) => 0,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// Outbound half of an established connection.
pub type WireSink = Pin<Box<dyn Sink<WireMessage, Error = FlareError> + Send>>;

/// Inbound half of an established connection.
pub type WireStream = Pin<Box<dyn Stream<Item = Result<WireMessage, FlareError>> + Send>>;

// ── Connector ────────────────────────────────────────────────────

/// Opens a new duplex connection to `endpoint`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<(WireSink, WireStream), FlareError>;
}
