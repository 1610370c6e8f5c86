//! WebSocket connector backed by `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info};

use crate::error::FlareError;
use crate::transport::{Connector, WireMessage, WireSink, WireStream};

/// Connects to `ws://` / `wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<(WireSink, WireStream), FlareError> {
        info!("connecting to {endpoint}");
        let (ws, _response) = connect_async(endpoint).await?;
        debug!("websocket handshake complete");

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(FlareError::from)
            .with(|msg: WireMessage| future::ready(Ok::<Message, FlareError>(to_tungstenite(msg))));

        let stream = read.filter_map(|item| future::ready(from_tungstenite(item)));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

// ── Conversions ──────────────────────────────────────────────────

fn to_tungstenite(msg: WireMessage) -> Message {
    match msg {
        WireMessage::Text(text) => Message::Text(text),
        WireMessage::Binary(bytes) => Message::Binary(bytes.to_vec()),
        WireMessage::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: CloseCode::Normal,
            reason: r.into(),
        })),
    }
}

/// Map an inbound websocket item. Ping/pong and raw frames are handled
/// by tungstenite itself and filtered out here.
fn from_tungstenite(
    item: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<WireMessage, FlareError>> {
    match item {
        Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text))),
        Ok(Message::Binary(data)) => Some(Ok(WireMessage::Binary(Bytes::from(data)))),
        Ok(Message::Close(frame)) => Some(Ok(WireMessage::Close(
            frame
                .map(|f| f.reason.into_owned())
                .filter(|reason| !reason.is_empty()),
        ))),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_mapping() {
        let msg = to_tungstenite(WireMessage::Text(r#"{"command":"stop"}"#.into()));
        assert_eq!(msg, Message::Text(r#"{"command":"stop"}"#.into()));

        let msg = to_tungstenite(WireMessage::Binary(Bytes::from_static(&[0xFF, 0xD8])));
        assert_eq!(msg, Message::Binary(vec![0xFF, 0xD8]));
    }

    #[test]
    fn inbound_mapping() {
        let mapped = from_tungstenite(Ok(Message::Binary(vec![1, 2, 3]))).unwrap().unwrap();
        assert_eq!(mapped, WireMessage::Binary(Bytes::from_static(&[1, 2, 3])));

        assert!(from_tungstenite(Ok(Message::Ping(vec![]))).is_none());

        let mapped = from_tungstenite(Ok(Message::Close(None))).unwrap().unwrap();
        assert_eq!(mapped, WireMessage::Close(None));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        // Port 9 on localhost is almost never listening.
        let result = WsConnector::new().connect("ws://127.0.0.1:9/video_feed").await;
        assert!(result.is_err());
    }
}
