//! HTTP request handlers

use super::types::{DispatchResponse, ErrorResponse, FlowInfo, FlowListResponse};
use super::ws::websocket;
use super::AppState;
use crate::event::{InboundEvent, Interaction, Message};
use crate::flow::FlowError;
use crate::interface::BufferInterface;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Buffered dispatch
        .route("/message", post(post_message))
        .route("/interaction", post(post_interaction))
        .route("/event", post(post_event))
        // Push sessions
        .route(
            "/websocket/client/:client_name/user/:user_id",
            get(websocket),
        )
        // Introspection
        .route("/flows", get(list_flows))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Buffered Dispatch
// ============================================================

async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> Result<Json<DispatchResponse>, AppError> {
    dispatch_buffered(&state, InboundEvent::Message(message)).await
}

async fn post_interaction(
    State(state): State<AppState>,
    Json(interaction): Json<Interaction>,
) -> Result<Json<DispatchResponse>, AppError> {
    dispatch_buffered(&state, InboundEvent::ButtonClick(interaction)).await
}

async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<DispatchResponse>, AppError> {
    dispatch_buffered(&state, event).await
}

async fn dispatch_buffered(
    state: &AppState,
    event: InboundEvent,
) -> Result<Json<DispatchResponse>, AppError> {
    let interface = Arc::new(BufferInterface::new());
    let outcome = state.manager.on_event(event, interface).await?;
    Ok(Json(outcome.into_output()))
}

// ============================================================
// Introspection
// ============================================================

async fn list_flows(State(state): State<AppState>) -> Json<FlowListResponse> {
    let flows = state
        .manager
        .registry()
        .iter()
        .map(|flow| FlowInfo {
            name: flow.name().to_string(),
            scope: flow.flow_scope().to_string(),
            steps: flow.step_names().map(str::to_string).collect(),
        })
        .collect();
    Json(FlowListResponse { flows })
}

async fn get_version() -> &'static str {
    concat!("switchyard ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub(super) enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match &err {
            FlowError::Validation(_) => AppError::BadRequest(err.to_string()),
            e if e.is_address() => AppError::BadRequest(err.to_string()),
            FlowError::FlowNotFound(_) => AppError::NotFound(err.to_string()),
            FlowError::StaleState { .. } => AppError::Conflict(err.to_string()),
            _ => {
                tracing::error!(error = %err, "Dispatch failed");
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
