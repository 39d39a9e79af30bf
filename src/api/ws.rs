//! WebSocket push sessions
//!
//! One receive loop per connection; each text frame is a JSON `Message`
//! dispatched inline, so a session's events never overlap. A writer task
//! drains `SessionFrame`s onto the socket.

use super::types::ErrorResponse;
use super::AppState;
use crate::dispatch::FlowManager;
use crate::event::{InboundEvent, Message};
use crate::interface::{SessionFrame, SessionInterface};
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(super) async fn websocket(
    ws: WebSocketUpgrade,
    Path((client_name, user_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state.manager, client_name, user_id))
}

async fn run_session(
    socket: WebSocket,
    manager: Arc<FlowManager>,
    client_name: String,
    user_id: String,
) {
    let (sink, stream) = socket.split();
    let (session, frames) = SessionInterface::open(client_name, user_id);
    drive_session(stream, sink, &manager, session, frames).await;
}

/// Receive loop for one session. Ends when the peer closes, the stream
/// fails, or the session is stopped; returns once the writer has drained.
async fn drive_session<St, Si>(
    mut stream: St,
    sink: Si,
    manager: &FlowManager,
    session: Arc<SessionInterface>,
    frames: mpsc::Receiver<SessionFrame>,
) where
    St: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
    Si: Sink<WsMessage> + Unpin + Send + 'static,
{
    let writer = tokio::spawn(write_frames(sink, frames));
    let cancel = session.cancellation();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => handle_text(manager, &session, &text).await,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {} // ping/pong handled by axum, binary ignored
            Some(Err(e)) => {
                tracing::debug!(user = %session.user_id(), error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    session.disconnect();
    // Dropping the last session handle closes the frame channel and ends the writer.
    drop(session);
    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "WebSocket writer task failed");
    }
}

async fn write_frames<Si>(mut sink: Si, mut frames: mpsc::Receiver<SessionFrame>)
where
    Si: Sink<WsMessage> + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let (message, closing) = match frame {
            SessionFrame::Payload(payload) => match serde_json::to_string(&payload) {
                Ok(json) => (WsMessage::Text(json), false),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode outgoing message");
                    continue;
                }
            },
            SessionFrame::Error { message } => {
                let body = serde_json::to_string(&ErrorResponse::new(message)).unwrap_or_default();
                (WsMessage::Text(body), false)
            }
            SessionFrame::Close { code, reason } => (
                WsMessage::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };

        if sink.send(message).await.is_err() || closing {
            break;
        }
    }
}

/// Parse, check and dispatch one text frame. Rejections never touch conversation state.
async fn handle_text(manager: &FlowManager, session: &Arc<SessionInterface>, text: &str) {
    let message: Message = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(user = %session.user_id(), error = %e, "Rejected malformed message");
            let _ = session.report_error(format!("malformed message: {e}")).await;
            return;
        }
    };

    if message.author.id != session.user_id() {
        tracing::warn!(
            user = %session.user_id(),
            author = %message.author.id,
            "Rejected message from another user"
        );
        let _ = session
            .report_error("message author does not match session user")
            .await;
        return;
    }

    let interface = Arc::clone(session);
    if let Err(e) = manager.on_event(InboundEvent::Message(message), interface).await {
        tracing::warn!(user = %session.user_id(), error = %e, "Dispatch failed");
        let _ = session.report_error(e.to_string()).await;
    }
}
