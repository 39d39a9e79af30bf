//! Transport-neutral output
//!
//! Steps only ever see `dyn Interface`. Two implementations exist:
//! - `BufferInterface` collects everything and hands it back when the
//!   request completes (HTTP)
//! - `SessionInterface` pushes each message as it is produced (WebSocket)

mod buffer;
mod session;

pub use buffer::BufferInterface;
pub use session::{SessionFrame, SessionInterface};

use crate::event::MessageToSend;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterfaceError {
    /// The peer is gone or the session was stopped
    #[error("interface is closed")]
    Closed,
}

/// Output sink for one transport connection or request
#[async_trait]
pub trait Interface: Send + Sync {
    async fn send(&self, message: MessageToSend) -> Result<(), InterfaceError>;

    /// End the interaction. Buffering interfaces return what they collected.
    async fn stop(
        &self,
        code: Option<u16>,
        reason: Option<String>,
    ) -> Result<Vec<MessageToSend>, InterfaceError>;

    /// Output to return to the caller once a dispatch completes
    async fn flush(&self) -> Option<Vec<MessageToSend>> {
        None
    }
}
