//! API request and response types

use crate::event::MessageToSend;
use serde::Serialize;

/// Body of every buffered dispatch; `null` when nothing was produced
pub type DispatchResponse = Option<Vec<MessageToSend>>;

/// Registered flow, as listed by `/flows`
#[derive(Debug, Serialize)]
pub struct FlowInfo {
    pub name: String,
    pub scope: String,
    pub steps: Vec<String>,
}

/// Response for flow listing
#[derive(Debug, Serialize)]
pub struct FlowListResponse {
    pub flows: Vec<FlowInfo>,
}

/// Error response, also used for WebSocket error frames
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
