//! Request/response interface

use super::{Interface, InterfaceError};
use crate::event::MessageToSend;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// Accumulates outgoing messages for a single request
#[derive(Debug, Default)]
pub struct BufferInterface {
    messages: Mutex<Vec<MessageToSend>>,
}

impl BufferInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of what has been collected so far
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<MessageToSend> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take(&self) -> Vec<MessageToSend> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Interface for BufferInterface {
    async fn send(&self, message: MessageToSend) -> Result<(), InterfaceError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }

    async fn stop(
        &self,
        _code: Option<u16>,
        _reason: Option<String>,
    ) -> Result<Vec<MessageToSend>, InterfaceError> {
        Ok(self.take())
    }

    /// `None` when nothing was produced
    async fn flush(&self) -> Option<Vec<MessageToSend>> {
        let messages = self.take();
        (!messages.is_empty()).then_some(messages)
    }
}
