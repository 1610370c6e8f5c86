//! In-process loopback connector.
//!
//! Each successful `connect` hands the detector end of the connection
//! to whoever holds the accept receiver, as a [`MemoryPeer`]. Used to
//! embed a detector in the same process and to drive the session
//! machine deterministically in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::FlareError;
use crate::transport::{Connector, WireMessage, WireSink, WireStream};

/// Connector whose connections terminate in-process.
#[derive(Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicBool>,
}

impl MemoryConnector {
    /// Create a connector and the receiver on which new peers arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                refuse: Arc::new(AtomicBool::new(false)),
            },
            accept_rx,
        )
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<(WireSink, WireStream), FlareError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(FlareError::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{endpoint} refused the connection"),
            )));
        }

        let (client_tx, server_rx) = fmpsc::unbounded();
        let (server_tx, client_rx) = fmpsc::unbounded();

        self.accept_tx
            .send(MemoryPeer {
                inbound: server_rx,
                outbound: server_tx,
            })
            .map_err(|_| FlareError::ChannelClosed)?;

        let sink = client_tx.sink_map_err(|_| FlareError::ChannelClosed);
        let stream = client_rx.map(Ok::<WireMessage, FlareError>);
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

// ── MemoryPeer ───────────────────────────────────────────────────

/// The detector end of an in-process connection.
///
/// Dropping the peer ends the connection as if the network died.
pub struct MemoryPeer {
    inbound: fmpsc::UnboundedReceiver<WireMessage>,
    outbound: fmpsc::UnboundedSender<WireMessage>,
}

impl MemoryPeer {
    /// Next message sent by the client, or `None` once it hung up.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.inbound.next().await
    }

    /// Next text message sent by the client, skipping frames.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.recv().await? {
                WireMessage::Text(text) => return Some(text),
                _ => continue,
            }
        }
    }

    /// Next binary frame sent by the client, skipping text.
    pub async fn recv_binary(&mut self) -> Option<Bytes> {
        loop {
            match self.recv().await? {
                WireMessage::Binary(data) => return Some(data),
                _ => continue,
            }
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), FlareError> {
        self.send(WireMessage::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), FlareError> {
        self.send(WireMessage::Binary(data.into()))
    }

    /// Close the connection with a reason.
    pub fn close(&self, reason: impl Into<String>) -> Result<(), FlareError> {
        self.send(WireMessage::Close(Some(reason.into())))
    }

    fn send(&self, msg: WireMessage) -> Result<(), FlareError> {
        self.outbound
            .unbounded_send(msg)
            .map_err(|_| FlareError::ChannelClosed)
    }
}
