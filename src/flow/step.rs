//! The unit of execution inside a flow

use super::FlowError;
use crate::buttons::InteractiveButton;
use crate::dispatch::FlowConnector;
use async_trait::async_trait;
use std::sync::Arc;

/// What a paused step decided about the reply it was waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResponse {
    /// Continue with the next step
    Done,
    /// Keep the flow paused on this step
    Stay,
}

/// One step of a flow.
///
/// Steps are stateless across invocations; anything they need to remember
/// goes into the connector's `data` or `bucket`.
///
/// A blocking step (the default) pauses the flow after `run` when another
/// step follows it. The next message or click for the conversation is handed
/// to `process_response`, which decides whether the flow moves on.
#[async_trait]
pub trait FlowStep: Send + Sync {
    async fn run(&self, connector: &mut FlowConnector) -> Result<(), FlowError>;

    async fn process_response(
        &self,
        _connector: &mut FlowConnector,
    ) -> Result<StepResponse, FlowError> {
        Ok(StepResponse::Done)
    }

    /// Non-blocking steps hand over to their successor in the same dispatch
    fn non_blocking(&self) -> bool {
        false
    }

    /// Buttons this step renders; registered with the manager alongside the flow
    fn buttons(&self) -> Vec<Arc<InteractiveButton>> {
        Vec::new()
    }
}
