//! Push-session interface
//!
//! The session owns the sending half of a bounded channel; the transport
//! task owns the receiving half and turns frames into socket writes.

use super::{Interface, InterfaceError};
use crate::event::MessageToSend;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const FRAME_BUFFER: usize = 64;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// What the transport writer should put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFrame {
    Payload(MessageToSend),
    /// Rejected input or failed dispatch; the session stays open
    Error { message: String },
    Close { code: u16, reason: String },
}

/// Interface for a long-lived connection with one user
#[derive(Debug)]
pub struct SessionInterface {
    client: String,
    user_id: String,
    frames: mpsc::Sender<SessionFrame>,
    cancel: CancellationToken,
}

impl SessionInterface {
    pub fn open(
        client: impl Into<String>,
        user_id: impl Into<String>,
    ) -> (Arc<Self>, mpsc::Receiver<SessionFrame>) {
        let (frames, rx) = mpsc::channel(FRAME_BUFFER);
        let session = Self {
            client: client.into(),
            user_id: user_id.into(),
            frames,
            cancel: CancellationToken::new(),
        };
        tracing::info!(client = %session.client, user = %session.user_id, "Session opened");
        (Arc::new(session), rx)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Cancelled when the session is stopped; ends the receive loop
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Report a problem to the peer without closing the session
    pub async fn report_error(&self, message: impl Into<String>) -> Result<(), InterfaceError> {
        self.push(SessionFrame::Error {
            message: message.into(),
        })
        .await
    }

    /// Stop receiving; frames already queued are still written
    pub fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(client = %self.client, user = %self.user_id, "Session closed");
            self.cancel.cancel();
        }
    }

    async fn push(&self, frame: SessionFrame) -> Result<(), InterfaceError> {
        if self.is_closed() {
            return Err(InterfaceError::Closed);
        }
        self.frames
            .send(frame)
            .await
            .map_err(|_| InterfaceError::Closed)
    }
}

#[async_trait]
impl Interface for SessionInterface {
    async fn send(&self, message: MessageToSend) -> Result<(), InterfaceError> {
        self.push(SessionFrame::Payload(message)).await
    }

    async fn stop(
        &self,
        code: Option<u16>,
        reason: Option<String>,
    ) -> Result<Vec<MessageToSend>, InterfaceError> {
        let frame = SessionFrame::Close {
            code: code.unwrap_or(CLOSE_NORMAL),
            reason: reason.unwrap_or_default(),
        };
        // The writer may already be gone; closing is still complete.
        let _ = self.push(frame).await;
        self.disconnect();
        Ok(Vec::new())
    }
}
