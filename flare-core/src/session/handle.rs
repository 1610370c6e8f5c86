//! Cloneable front door to a running session.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::FlareError;
use crate::session::event::{Admission, SessionEvent, UserIntent};
use crate::state::{ChannelState, SessionMode};

/// Sends user intents into the session loop and observes its state.
///
/// Every request is answered once the loop has processed it; the
/// answer says whether the session started, was deferred until the
/// channel opens, or stopped.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    mode: watch::Receiver<SessionMode>,
    channel: watch::Receiver<ChannelState>,
}

impl SessionHandle {
    pub(crate) fn new(
        events: mpsc::Sender<SessionEvent>,
        mode: watch::Receiver<SessionMode>,
        channel: watch::Receiver<ChannelState>,
    ) -> Self {
        Self {
            events,
            mode,
            channel,
        }
    }

    /// Upload `file` and stream the detector's output.
    pub async fn start_video(&self, file: impl Into<PathBuf>) -> Result<Admission, FlareError> {
        self.request(UserIntent::StartVideo(file.into())).await
    }

    /// Stream the live camera.
    pub async fn start_webcam(&self) -> Result<Admission, FlareError> {
        self.request(UserIntent::StartWebcam).await
    }

    /// Stop the active stream.
    pub async fn stop(&self) -> Result<Admission, FlareError> {
        self.request(UserIntent::Stop).await
    }

    /// Stop everything, close the channel and end the loop.
    pub async fn shutdown(&self) -> Result<(), FlareError> {
        self.events.send(SessionEvent::Shutdown).await?;
        Ok(())
    }

    pub fn mode(&self) -> SessionMode {
        *self.mode.borrow()
    }

    pub fn channel_state(&self) -> ChannelState {
        *self.channel.borrow()
    }

    /// Wait until the session mode satisfies `pred`.
    pub async fn wait_for_mode(
        &self,
        pred: impl Fn(SessionMode) -> bool,
    ) -> Result<SessionMode, FlareError> {
        let mut rx = self.mode.clone();
        loop {
            let mode = *rx.borrow_and_update();
            if pred(mode) {
                return Ok(mode);
            }
            rx.changed().await.map_err(|_| FlareError::ChannelClosed)?;
        }
    }

    async fn request(&self, intent: UserIntent) -> Result<Admission, FlareError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(SessionEvent::UserIntent {
                intent,
                reply: Some(reply),
            })
            .await?;
        rx.await.map_err(|_| FlareError::ChannelClosed)?
    }
}
