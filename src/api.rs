//! HTTP and WebSocket transports
//!
//! Both end up in `FlowManager::on_event`; the HTTP routes use a
//! `BufferInterface`, the WebSocket route a `SessionInterface`.

mod handlers;
mod types;
mod ws;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::dispatch::FlowManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<FlowManager>,
}

impl AppState {
    pub fn new(manager: FlowManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }
}
