//! The streaming session state machine and its event loop.
//!
//! [`StreamingSession`] owns the session mode, the transport channel and
//! the render pipeline. It processes one [`SessionEvent`] at a time;
//! I/O, uploads, the capture pump, rendering and timers all run in
//! their own tasks and report back through the event queue.
//!
//! ```text
//!                  ┌──────────── SessionHandle (user intents) ─────────┐
//!                  ▼                                                   │
//!  reader task ──► event queue ──► StreamingSession ──► ChannelLink ──►│ writer task
//!  upload task ──►      ▲               │   │                          │
//!  timers ──────────────┘               │   └──► RenderPipeline ──► OutputSurface
//!                                       └──────► CapturePump ──► ChannelLink
//! ```

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::{CapturePump, MediaProvider, MediaSource};
use crate::error::FlareError;
use crate::protocol::{ControlCommand, StatusLevel, StatusMessage};
use crate::render::{FrameRenderer, OutputSurface, RenderPipeline};
use crate::session::config::SessionConfig;
use crate::session::event::{Admission, IntentReply, SessionEvent, UserIntent};
use crate::session::handle::SessionHandle;
use crate::state::{ChannelState, SessionMode};
use crate::status::{ConnectionIndicator, StatusSink};
use crate::transport::{Connector, TransportChannel, WireMessage};
use crate::upload::VideoUploader;

// ── Collaborators ────────────────────────────────────────────────

/// Everything the session talks to outside itself.
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub uploader: Arc<dyn VideoUploader>,
    pub media: Arc<dyn MediaProvider>,
    pub surface: Box<dyn OutputSurface>,
    pub status: Arc<dyn StatusSink>,
}

struct ActiveCapture {
    source: Arc<dyn MediaSource>,
    pump: CapturePump,
}

/// A start request waiting for the channel to open.
struct PendingIntent {
    ticket: u64,
    intent: UserIntent,
    expiry: JoinHandle<()>,
}

// ── StreamingSession ─────────────────────────────────────────────

/// The single streaming session of a client.
pub struct StreamingSession {
    config: SessionConfig,
    mode: SessionMode,
    mode_tx: watch::Sender<SessionMode>,
    channel: TransportChannel,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    uploader: Arc<dyn VideoUploader>,
    media: Arc<dyn MediaProvider>,
    status: Arc<dyn StatusSink>,
    render: RenderPipeline,
    capture: Option<ActiveCapture>,
    pending: Option<PendingIntent>,
    upload_ticket: Option<u64>,
    next_ticket: u64,
}

impl StreamingSession {
    /// Build a session and the handle used to drive it.
    ///
    /// Must be called inside a tokio runtime: the render task starts
    /// immediately. The channel is not opened until [`connect`] or
    /// [`run`] is called.
    ///
    /// [`connect`]: Self::connect
    /// [`run`]: Self::run
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> (Self, SessionHandle) {
        let Collaborators {
            connector,
            uploader,
            media,
            surface,
            status,
        } = collaborators;

        let (events_tx, events_rx) = mpsc::channel(config.event_queue.max(1));
        let (mode_tx, mode_rx) = watch::channel(SessionMode::Idle);
        let channel = TransportChannel::new(connector, config.channel(), events_tx.clone());
        let render = RenderPipeline::spawn(surface, Arc::clone(&status), FrameRenderer::new());

        let handle = SessionHandle::new(events_tx.clone(), mode_rx, channel.link().subscribe());
        let session = Self {
            config,
            mode: SessionMode::Idle,
            mode_tx,
            channel,
            events_tx,
            events_rx,
            uploader,
            media,
            status,
            render,
            capture: None,
            pending: None,
            upload_ticket: None,
            next_ticket: 0,
        };
        (session, handle)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// `true` iff the mode is not `Idle`.
    pub fn is_active(&self) -> bool {
        self.mode.is_active()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn channel_generation(&self) -> u64 {
        self.channel.generation()
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.channel.reconnect_scheduled()
    }

    /// The start request waiting for the channel, if any.
    pub fn pending_intent(&self) -> Option<&UserIntent> {
        self.pending.as_ref().map(|p| &p.intent)
    }

    /// Whether a capture pump is attached to the session.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn render(&self) -> &RenderPipeline {
        &self.render
    }

    // ── Channel ──────────────────────────────────────────────────

    /// Open the channel unless it is already open or connecting.
    pub fn connect(&mut self) {
        if self.channel.connect() {
            self.status
                .connection(ConnectionIndicator::Connecting, self.channel.endpoint());
        }
    }

    /// Queue a message on the channel; dropped unless open.
    pub fn send(&self, msg: WireMessage) -> bool {
        self.channel.send(msg)
    }

    // ── User intents ─────────────────────────────────────────────

    /// Upload `file` and, once accepted, ask the detector to stream it.
    pub async fn request_start_video(&mut self, file: PathBuf) -> Result<Admission, FlareError> {
        self.request_start(UserIntent::StartVideo(file)).await
    }

    /// Acquire the camera and stream it to the detector.
    pub async fn request_start_webcam(&mut self) -> Result<Admission, FlareError> {
        self.request_start(UserIntent::StartWebcam).await
    }

    /// Stop the active stream. The session always ends up `Idle`, even
    /// when the `stop` command cannot be delivered.
    pub fn request_stop(&mut self) -> Result<Admission, FlareError> {
        if !self.mode.is_streaming() {
            if let Some(pending) = self.pending.take() {
                pending.expiry.abort();
                info!("discarded pending {} request", pending.intent.name());
                return Ok(Admission::Stopped);
            }
            return Err(FlareError::NotStreaming(self.mode));
        }

        if self.channel.state().is_open() {
            self.channel.send_command(&ControlCommand::Stop);
        }
        self.force_idle();
        self.report(StatusLevel::Info, "Stream stopped");
        Ok(Admission::Stopped)
    }

    async fn request_start(&mut self, intent: UserIntent) -> Result<Admission, FlareError> {
        if !self.mode.is_idle() {
            return Err(FlareError::SessionBusy(self.mode));
        }
        if self.pending.is_some() {
            return Err(FlareError::StartPending);
        }
        if !self.channel.state().is_open() {
            self.connect();
            self.defer(intent);
            return Ok(Admission::Deferred);
        }

        match intent {
            UserIntent::StartVideo(file) => self.start_upload(file),
            UserIntent::StartWebcam => self.start_webcam().await,
            UserIntent::Stop => self.request_stop(),
        }
    }

    fn defer(&mut self, intent: UserIntent) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let window = self.config.pending_intent_window;
        let events = self.events_tx.clone();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = events.send(SessionEvent::PendingExpired { ticket }).await;
        });

        info!("channel not open; holding {} request for {window:?}", intent.name());
        self.report(StatusLevel::Info, "Connecting to server...");
        self.pending = Some(PendingIntent {
            ticket,
            intent,
            expiry,
        });
    }

    fn start_upload(&mut self, file: PathBuf) -> Result<Admission, FlareError> {
        self.mode.begin_upload()?;
        self.publish_mode();

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.upload_ticket = Some(ticket);

        let uploader = Arc::clone(&self.uploader);
        let events = self.events_tx.clone();
        info!("uploading {}", file.display());
        self.report(StatusLevel::Info, "Uploading video...");
        tokio::spawn(async move {
            let result = uploader.upload(&file).await;
            let _ = events
                .send(SessionEvent::UploadFinished { ticket, result })
                .await;
        });
        Ok(Admission::Started)
    }

    async fn start_webcam(&mut self) -> Result<Admission, FlareError> {
        let source = match self.media.acquire(&self.config.constraints).await {
            Ok(source) => source,
            Err(e) => {
                warn!("media acquisition failed: {e}");
                self.report(StatusLevel::Error, reason_of(&e));
                return Err(e);
            }
        };

        // The channel may have dropped while the user was being asked
        // for camera access.
        if !self.channel.send_command(&ControlCommand::StartWebcam) {
            source.release();
            self.report(
                StatusLevel::Error,
                "Connection lost before the webcam stream could start",
            );
            return Err(FlareError::ChannelNotOpen);
        }

        self.mode.begin_webcam_stream()?;
        self.publish_mode();
        let pump = CapturePump::spawn(
            Arc::clone(&source),
            self.channel.link(),
            self.mode_tx.subscribe(),
            self.config.pump(),
        );
        self.capture = Some(ActiveCapture { source, pump });
        self.report(StatusLevel::Info, "Webcam streaming started");
        Ok(Admission::Started)
    }

    /// Return to `Idle` unconditionally, stopping the pump and
    /// releasing the media source.
    pub fn force_idle(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.pump.stop();
            capture.source.release();
        }
        self.upload_ticket = None;
        let previous = self.mode.force_idle();
        if previous != SessionMode::Idle {
            info!("session {previous} -> Idle");
            self.publish_mode();
        }
    }

    // ── Event loop ───────────────────────────────────────────────

    /// Connect, then process events until shutdown.
    pub async fn run(mut self) {
        info!("session started for {}", self.channel.endpoint());
        self.connect();
        while let Some(event) = self.next_event().await {
            if self.handle_event(event).await.is_break() {
                break;
            }
        }
        self.render.shutdown().await;
        info!("session finished");
    }

    /// Next queued event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Apply one event.
    pub async fn handle_event(&mut self, event: SessionEvent) -> ControlFlow<()> {
        debug!("handling {} in {}", event.name(), self.mode);
        match event {
            SessionEvent::ChannelOpened { generation } => self.on_channel_opened(generation).await,
            SessionEvent::ChannelClosed { generation, reason } => {
                self.on_channel_closed(generation, &reason)
            }
            SessionEvent::TextMessage { generation, text } => self.on_text(generation, &text),
            SessionEvent::BinaryMessage {
                generation,
                payload,
            } => self.on_binary(generation, payload),
            SessionEvent::UserIntent { intent, reply } => self.on_intent(intent, reply).await,
            SessionEvent::UploadFinished { ticket, result } => {
                self.on_upload_finished(ticket, result)
            }
            SessionEvent::PendingExpired { ticket } => self.on_pending_expired(ticket),
            SessionEvent::ReconnectDue { generation } => {
                if self.channel.on_reconnect_due(generation) {
                    self.status
                        .connection(ConnectionIndicator::Connecting, self.channel.endpoint());
                }
            }
            SessionEvent::Shutdown => {
                self.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_intent(&mut self, intent: UserIntent, reply: Option<IntentReply>) {
        let name = intent.name();
        let result = match intent {
            UserIntent::StartVideo(file) => self.request_start_video(file).await,
            UserIntent::StartWebcam => self.request_start_webcam().await,
            UserIntent::Stop => self.request_stop(),
        };
        match &result {
            Ok(admission) => debug!("{name} request: {admission:?}"),
            Err(
                e @ (FlareError::SessionBusy(_)
                | FlareError::StartPending
                | FlareError::NotStreaming(_)),
            ) => {
                warn!("{name} request rejected: {e}");
                self.report(StatusLevel::Warning, e.to_string());
            }
            Err(e) => warn!("{name} request failed: {e}"),
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    async fn on_channel_opened(&mut self, generation: u64) {
        if !self.channel.on_opened(generation) {
            return;
        }
        self.status
            .connection(ConnectionIndicator::Connected, self.channel.endpoint());
        if self.mode.is_active() {
            warn!("clearing stale {} session on new connection", self.mode);
            self.force_idle();
        }

        let Some(pending) = self.pending.take() else {
            return;
        };
        pending.expiry.abort();
        let name = pending.intent.name();
        info!("replaying pending {name} request");
        if let Err(e) = self.request_start(pending.intent).await {
            warn!("replayed {name} request failed: {e}");
        }
    }

    fn on_channel_closed(&mut self, generation: u64, reason: &str) {
        if !self.channel.on_closed(generation, reason) {
            return;
        }
        self.status.connection(
            ConnectionIndicator::Disconnected,
            &format!("Disconnected: {reason}"),
        );
        if self.mode.is_active() {
            self.force_idle();
            self.report(StatusLevel::Error, "Connection lost. Stream stopped.");
        }
    }

    fn on_text(&mut self, generation: u64, text: &str) {
        if generation != self.channel.generation() {
            return;
        }
        let message = match StatusMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("unparseable status from detector: {e}");
                self.report(StatusLevel::Error, format!("Malformed message from server: {e}"));
                return;
            }
        };

        if let Some(counts) = message.detection_counts() {
            self.status.detections(&counts);
        }
        if message.is_reportable() {
            self.status.status(&message);
        }

        if message.is_error() || message.is_terminal() {
            if self.mode.is_active() {
                info!("detector ended the session: {}", message.message);
            }
            self.force_idle();
        }
    }

    fn on_binary(&mut self, generation: u64, payload: Bytes) {
        if generation != self.channel.generation() {
            return;
        }
        self.render.submit(payload);
    }

    fn on_upload_finished(&mut self, ticket: u64, result: Result<String, FlareError>) {
        if self.upload_ticket != Some(ticket) || self.mode != SessionMode::UploadingVideo {
            debug!("discarding result of superseded upload {ticket}");
            return;
        }
        self.upload_ticket = None;

        let filename = match result {
            Ok(filename) => filename,
            Err(e) => {
                warn!("upload failed: {e}");
                self.force_idle();
                self.report(StatusLevel::Error, format!("Upload failed: {}", reason_of(&e)));
                return;
            }
        };

        let command = ControlCommand::StartFile {
            filename: filename.clone(),
        };
        if !self.channel.send_command(&command) {
            self.force_idle();
            self.report(StatusLevel::Error, "Connection lost before streaming could start");
            return;
        }
        if let Err(e) = self.mode.begin_video_stream() {
            warn!("{e}");
            self.force_idle();
            return;
        }
        self.publish_mode();
        self.report(StatusLevel::Info, format!("Processing video: {filename}"));
    }

    fn on_pending_expired(&mut self, ticket: u64) {
        if self.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            if let Some(pending) = self.pending.take() {
                warn!("{} request expired before the channel opened", pending.intent.name());
            }
            self.report(
                StatusLevel::Warning,
                "Could not connect to server; request discarded",
            );
        }
    }

    fn shutdown(&mut self) {
        info!("session shutting down");
        if self.mode.is_streaming() {
            let _ = self.request_stop();
        } else {
            self.force_idle();
        }
        if let Some(pending) = self.pending.take() {
            pending.expiry.abort();
        }
        self.channel.close("client shutdown");
        self.status
            .connection(ConnectionIndicator::Disconnected, "Disconnected: client shutdown");
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn publish_mode(&self) {
        let previous = self.mode_tx.send_replace(self.mode);
        if self.mode.is_streaming() && !previous.is_streaming() {
            // Time spent idle or uploading is not part of the frame rate.
            self.render.restart_rate_window();
        }
        self.status.session(self.mode);
    }

    fn report(&self, level: StatusLevel, message: impl Into<String>) {
        self.status.status(&StatusMessage::new(level, message));
    }
}

/// The user-facing reason of a collaborator failure, without the
/// variant prefix.
fn reason_of(e: &FlareError) -> String {
    match e {
        FlareError::MediaUnavailable(reason) | FlareError::Upload(reason) => reason.clone(),
        other => other.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────
