//! The single duplex channel to the detector.
//!
//! [`TransportChannel`] owns the lifecycle: it opens connections through
//! a [`Connector`], runs one reader and one writer task per connection,
//! and schedules a reconnection after an unexpected close. Other
//! components get a [`ChannelLink`], which can observe the state and
//! send, but never replace the channel.
//!
//! ```text
//!  session loop ──connect()──► connector task ──► writer task ──► network
//!       ▲                                   └──► reader task ◄── network
//!       └──────── SessionEvent::{ChannelOpened, TextMessage, …} ◄──┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::protocol::ControlCommand;
use crate::session::SessionEvent;
use crate::state::ChannelState;
use crate::transport::{Connector, WireMessage, WireSink, WireStream};

// ── ChannelConfig ────────────────────────────────────────────────

/// Configuration for [`TransportChannel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Fixed detector endpoint, e.g. `ws://host:5000/video_feed`.
    pub endpoint: String,
    /// Delay before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
    /// Outbound queue depth; sends beyond it are dropped.
    pub outbound_queue: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:5000/video_feed".into(),
            reconnect_delay: Duration::from_millis(3000),
            outbound_queue: 8,
        }
    }
}

// ── ChannelLink ──────────────────────────────────────────────────

struct LinkShared {
    state: watch::Sender<ChannelState>,
    outbound: Mutex<Option<mpsc::Sender<WireMessage>>>,
}

/// Cloneable, non-owning view of the channel.
///
/// Sends are fire-and-forget: anything offered while the channel is
/// not open, or while the outbound queue is full, is dropped.
#[derive(Clone)]
pub struct ChannelLink {
    shared: Arc<LinkShared>,
}

impl ChannelLink {
    fn new() -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        Self {
            shared: Arc::new(LinkShared {
                state,
                outbound: Mutex::new(None),
            }),
        }
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Queue a message. Returns `false` if it was dropped.
    pub fn send(&self, msg: WireMessage) -> bool {
        if !self.is_open() {
            trace!("channel not open; dropping {} byte message", msg.len());
            return false;
        }
        let outbound = self.outbound();
        let Some(tx) = outbound.as_ref() else {
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                debug!("outbound queue full; dropping {} byte message", msg.len());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Serialize and queue a control command.
    pub fn send_command(&self, command: &ControlCommand) -> bool {
        match command.to_json() {
            Ok(json) => {
                let sent = self.send(WireMessage::Text(json));
                if sent {
                    debug!("sent {} command", command.name());
                } else {
                    warn!("{} command not delivered: channel not open", command.name());
                }
                sent
            }
            Err(e) => {
                warn!("failed to encode {} command: {e}", command.name());
                false
            }
        }
    }

    // ── Owner-only mutation ──────────────────────────────────────

    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::Sender<WireMessage>>> {
        self.shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ChannelState) {
        self.shared.state.send_replace(state);
    }
}

// ── TransportChannel ─────────────────────────────────────────────

/// Owner of the single channel instance.
///
/// Mutated only by the session loop. Every connection attempt gets a
/// new generation number; events tagged with an older generation
/// belong to a replaced instance and are ignored.
pub struct TransportChannel {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    link: ChannelLink,
    events: mpsc::Sender<SessionEvent>,
    generation: u64,
    reconnect: Option<JoinHandle<()>>,
}

impl TransportChannel {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ChannelConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            connector,
            config,
            link: ChannelLink::new(),
            events,
            generation: 0,
            reconnect: None,
        }
    }

    /// A non-owning view for senders and observers.
    pub fn link(&self) -> ChannelLink {
        self.link.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.link.state()
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Generation of the current (or most recent) instance.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a reconnection is waiting on its delay.
    pub fn reconnect_scheduled(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Start a new connection unless one is open or connecting.
    ///
    /// Returns `true` when a new attempt was started. The outcome
    /// arrives later as `ChannelOpened` or `ChannelClosed`.
    pub fn connect(&mut self) -> bool {
        let mut state = self.state();
        if state.is_live() {
            debug!("channel already {state}; connect is a no-op");
            return false;
        }
        if state == ChannelState::Closing {
            state.force_closed();
        }
        if let Err(e) = state.begin_connect() {
            warn!("connect rejected: {e}");
            return false;
        }

        self.generation += 1;
        let generation = self.generation;
        let (out_tx, out_rx) = mpsc::channel(self.config.outbound_queue.max(1));
        *self.link.outbound() = Some(out_tx);
        self.link.set_state(state);

        let connector = Arc::clone(&self.connector);
        let endpoint = self.config.endpoint.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match connector.connect(&endpoint).await {
                Ok((sink, stream)) => {
                    tokio::spawn(writer_task(sink, out_rx, generation, events.clone()));
                    if events
                        .send(SessionEvent::ChannelOpened { generation })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    reader_task(stream, generation, events).await;
                }
                Err(e) => {
                    let _ = events
                        .send(SessionEvent::ChannelClosed {
                            generation,
                            reason: e.to_string(),
                        })
                        .await;
                }
            }
        });

        info!("connecting to {} (generation {generation})", self.config.endpoint);
        true
    }

    /// Queue a message; dropped unless the channel is open.
    pub fn send(&self, msg: WireMessage) -> bool {
        self.link.send(msg)
    }

    pub fn send_command(&self, command: &ControlCommand) -> bool {
        self.link.send_command(command)
    }

    /// Close the channel locally. Idempotent; never reconnects.
    pub fn close(&mut self, reason: &str) {
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
        let mut state = self.state();
        if state.begin_close().is_err() {
            return;
        }
        self.link.set_state(state);

        // Dropping the sender lets the writer flush and close the sink.
        self.link.outbound().take();
        // Late events from this instance must not be mistaken for a
        // network failure.
        self.generation += 1;

        let _ = state.finish_close();
        self.link.set_state(state);
        info!("channel closed: {reason}");
    }

    /// Apply a `ChannelOpened` event. Returns `true` if it belonged to
    /// the current instance.
    pub fn on_opened(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            debug!("ignoring open of stale channel generation {generation}");
            return false;
        }
        let mut state = self.state();
        if let Err(e) = state.mark_open() {
            warn!("unexpected open: {e}");
            return false;
        }
        self.link.set_state(state);
        info!("channel open");
        true
    }

    /// Apply a `ChannelClosed` event.
    ///
    /// Returns `true` when the current instance was lost unexpectedly;
    /// the channel is then `Closed` and exactly one reconnection is
    /// scheduled after the configured delay.
    pub fn on_closed(&mut self, generation: u64, reason: &str) -> bool {
        if generation != self.generation {
            debug!("ignoring close of stale channel generation {generation}");
            return false;
        }
        let mut state = self.state();
        if state.is_closed() {
            return false;
        }
        let uptime = state.open_duration();
        state.force_closed();
        self.link.set_state(state);
        self.link.outbound().take();
        match uptime {
            Some(uptime) => warn!("channel lost after {uptime:?}: {reason}"),
            None => warn!("channel lost: {reason}"),
        }

        self.schedule_reconnect();
        true
    }

    /// Apply a `ReconnectDue` event.
    ///
    /// A timer scheduled for an instance that has since been closed
    /// locally or replaced is ignored, even if its event was already
    /// queued when the timer was aborted.
    pub fn on_reconnect_due(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            debug!("ignoring reconnect scheduled for generation {generation}");
            return false;
        }
        if !self.state().is_closed() {
            debug!("channel {}; ignoring reconnect", self.state());
            return false;
        }
        self.reconnect = None;
        self.connect()
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_some() {
            return;
        }
        let delay = self.config.reconnect_delay;
        let generation = self.generation;
        let events = self.events.clone();
        info!("reconnecting in {delay:?}");
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::ReconnectDue { generation }).await;
        }));
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
    }
}

// ── I/O tasks ────────────────────────────────────────────────────

async fn writer_task(
    mut sink: WireSink,
    mut rx: mpsc::Receiver<WireMessage>,
    generation: u64,
    events: mpsc::Sender<SessionEvent>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg).await {
            warn!("channel write error: {e}");
            let _ = events
                .send(SessionEvent::ChannelClosed {
                    generation,
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    }
    let _ = sink.close().await;
    debug!("writer for generation {generation} finished");
}

async fn reader_task(mut stream: WireStream, generation: u64, events: mpsc::Sender<SessionEvent>) {
    let reason = loop {
        let event = match stream.next().await {
            Some(Ok(WireMessage::Text(text))) => SessionEvent::TextMessage { generation, text },
            Some(Ok(WireMessage::Binary(payload))) => {
                SessionEvent::BinaryMessage { generation, payload }
            }
            Some(Ok(WireMessage::Close(reason))) => {
                break reason.unwrap_or_else(|| "closed by server".to_string());
            }
            Some(Err(e)) => break e.to_string(),
            None => break "connection died".to_string(),
        };
        if events.send(event).await.is_err() {
            return;
        }
    };
    let _ = events
        .send(SessionEvent::ChannelClosed { generation, reason })
        .await;
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnector;
    use bytes::Bytes;
    use tokio::time::Instant;

    fn channel_with(
        connector: MemoryConnector,
    ) -> (TransportChannel, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let channel = TransportChannel::new(Arc::new(connector), ChannelConfig::default(), tx);
        (channel, rx)
    }

    async fn open(channel: &mut TransportChannel, rx: &mut mpsc::Receiver<SessionEvent>) {
        assert!(channel.connect());
        match rx.recv().await.unwrap() {
            SessionEvent::ChannelOpened { generation } => assert!(channel.on_opened(generation)),
            other => panic!("expected open, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn send_dropped_unless_open() {
        let (connector, mut accept) = MemoryConnector::new();
        let (mut channel, mut rx) = channel_with(connector);

        assert!(!channel.send(WireMessage::Text("early".into())));

        open(&mut channel, &mut rx).await;
        let mut peer = accept.recv().await.unwrap();
        assert!(channel.send_command(&ControlCommand::StartWebcam));
        assert_eq!(peer.recv_text().await.unwrap(), r#"{"command":"start_webcam"}"#);
    }

    #[tokio::test]
    async fn connect_is_noop_while_live() {
        let (connector, _accept) = MemoryConnector::new();
        let (mut channel, mut rx) = channel_with(connector);

        assert!(channel.connect());
        assert_eq!(channel.state(), ChannelState::Connecting);
        assert!(!channel.connect());
        assert_eq!(channel.generation(), 1);

        let _ = rx.recv().await;
    }

    #[tokio::test]
    async fn inbound_messages_are_routed_with_generation() {
        let (connector, mut accept) = MemoryConnector::new();
        let (mut channel, mut rx) = channel_with(connector);
        open(&mut channel, &mut rx).await;
        let peer = accept.recv().await.unwrap();

        peer.send_text(r#"{"status":"info","message":"hi"}"#).unwrap();
        peer.send_binary(Bytes::from_static(&[0xFF, 0xD8])).unwrap();

        match rx.recv().await.unwrap() {
            SessionEvent::TextMessage { generation, text } => {
                assert_eq!(generation, 1);
                assert!(text.contains("hi"));
            }
            other => panic!("unexpected {}", other.name()),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::BinaryMessage { generation: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_schedules_one_reconnect() {
        let (connector, mut accept) = MemoryConnector::new();
        let (mut channel, mut rx) = channel_with(connector);
        open(&mut channel, &mut rx).await;
        drop(accept.recv().await.unwrap());

        let closed_at = Instant::now();
        match rx.recv().await.unwrap() {
            SessionEvent::ChannelClosed { generation, reason } => {
                assert!(channel.on_closed(generation, &reason));
                // A duplicate report for the same instance is ignored.
                assert!(!channel.on_closed(generation, &reason));
            }
            other => panic!("unexpected {}", other.name()),
        }
        assert!(channel.state().is_closed());
        assert!(channel.reconnect_scheduled());

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::ReconnectDue { generation: 1 }
        ));
        assert!(closed_at.elapsed() >= Duration::from_millis(3000));
        assert!(channel.on_reconnect_due(1));
        assert_eq!(channel.generation(), 2);
        assert!(!channel.reconnect_scheduled());
    }

    #[tokio::test]
    async fn failed_connect_reports_close() {
        let (connector, _accept) = MemoryConnector::new();
        connector.refuse_connections(true);
        let (mut channel, mut rx) = channel_with(connector);

        channel.connect();
        match rx.recv().await.unwrap() {
            SessionEvent::ChannelClosed { generation, reason } => {
                assert!(reason.contains("refused"));
                assert!(channel.on_closed(generation, &reason));
            }
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[tokio::test]
    async fn local_close_is_idempotent_and_ignores_late_events() {
        let (connector, mut accept) = MemoryConnector::new();
        let (mut channel, mut rx) = channel_with(connector);
        open(&mut channel, &mut rx).await;
        let mut peer = accept.recv().await.unwrap();

        channel.close("shutdown");
        channel.close("shutdown again");
        assert!(channel.state().is_closed());
        assert!(!channel.send(WireMessage::Text("late".into())));

        // The writer closes the connection once its sender is gone.
        assert!(peer.recv().await.is_none());
        drop(peer);

        if let Some(SessionEvent::ChannelClosed { generation, reason }) = rx.recv().await {
            assert!(!channel.on_closed(generation, &reason));
        }
        assert!(!channel.reconnect_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_reconnect_is_ignored_after_local_close() {
        let (connector, mut accept) = MemoryConnector::new();
        let (mut channel, mut rx) = channel_with(connector);
        open(&mut channel, &mut rx).await;
        drop(accept.recv().await.unwrap());

        match rx.recv().await.unwrap() {
            SessionEvent::ChannelClosed { generation, reason } => {
                assert!(channel.on_closed(generation, &reason));
            }
            other => panic!("unexpected {}", other.name()),
        }

        // The timer fires and its event sits in the queue before the
        // session gets to handle it.
        let due = match rx.recv().await.unwrap() {
            SessionEvent::ReconnectDue { generation } => generation,
            other => panic!("unexpected {}", other.name()),
        };
        channel.close("user closed");
        let generation = channel.generation();

        assert!(!channel.on_reconnect_due(due));
        assert!(channel.state().is_closed());
        assert_eq!(channel.generation(), generation);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_reconnecting_while_server_refuses() {
        let (connector, _accept) = MemoryConnector::new();
        connector.refuse_connections(true);
        let (mut channel, mut rx) = channel_with(connector);

        assert!(channel.connect());
        let mut last_close: Option<Instant> = None;
        for attempt in 1..=6u64 {
            assert_eq!(channel.generation(), attempt);
            match rx.recv().await.unwrap() {
                SessionEvent::ChannelClosed { generation, reason } => {
                    assert_eq!(generation, attempt);
                    assert!(channel.on_closed(generation, &reason));
                }
                other => panic!("unexpected {}", other.name()),
            }
            let closed_at = Instant::now();
            if let Some(previous) = last_close {
                assert!(closed_at - previous >= Duration::from_millis(3000));
            }
            last_close = Some(closed_at);

            if attempt == 6 {
                break;
            }
            match rx.recv().await.unwrap() {
                SessionEvent::ReconnectDue { generation } => {
                    assert!(closed_at.elapsed() >= Duration::from_millis(3000));
                    assert!(channel.on_reconnect_due(generation));
                }
                other => panic!("unexpected {}", other.name()),
            }
        }
        assert_eq!(channel.generation(), 6);
        assert!(channel.reconnect_scheduled());
    }
}
