//! Engine error types

use crate::interface::InterfaceError;
use crate::storage::{StepPointer, StoreError};
use thiserror::Error;

/// Errors raised while defining or dispatching flows
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed input (button limits, empty ids)
    #[error("validation failed: {0}")]
    Validation(String),
    /// Store failure, including an unaddressable conversation
    #[error(transparent)]
    Storage(#[from] StoreError),
    /// Invalid flow or button definition
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("flow not found: {0}")]
    FlowNotFound(String),
    /// Persisted pointer names a flow or step that no longer exists
    #[error("stale conversation state: {pointer}")]
    StaleState { pointer: StepPointer },
    #[error("flow {0:?} is already registered")]
    DuplicateFlow(String),
    #[error(transparent)]
    Interface(#[from] InterfaceError),
    /// Failure reported by a step or action handler
    #[error("step failed: {0}")]
    Step(String),
}

impl FlowError {
    #[allow(dead_code)] // API completeness
    pub fn step(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }

    /// True for the missing-address storage error
    pub fn is_address(&self) -> bool {
        matches!(self, Self::Storage(StoreError::Address))
    }
}
