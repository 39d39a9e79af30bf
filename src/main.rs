//! Switchyard - conversational flow engine
//!
//! Routes chat events to multi-step conversation flows, persists where each
//! conversation paused, and serves the engine over HTTP and WebSocket.

mod api;
mod buttons;
mod config;
mod demo;
mod dispatch;
mod event;
mod flow;
mod interface;
mod storage;

use api::{create_router, AppState};
use config::AppConfig;
use dispatch::FlowManager;
use std::net::SocketAddr;
use std::sync::Arc;
use storage::{ConversationStore, MemoryStorage};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchyard=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env();
    tracing::info!(
        port = config.port,
        prefix = %config.dispatch.command_prefix,
        aliases = config.dispatch.command_aliases,
        "Loaded configuration"
    );

    // Flow engine
    let storage = Arc::new(MemoryStorage::new());
    let mut manager = FlowManager::new(storage.clone(), config.dispatch.clone());
    demo::register(&mut manager)?;
    tracing::info!(flows = manager.registry().len(), "Flow registry initialized");

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(manager))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Switchyard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(records = storage.len().await, "Shutting down");
    storage.close().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
