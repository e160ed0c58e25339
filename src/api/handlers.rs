//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::types::{
    CreateSessionRequest, ErrorResponse, ListSessionsResponse, ResizeRequest, SessionDescriptor,
};
use crate::error::GatewayError;
use crate::remote::{ShellConnector, SshConnector};
use crate::session::{SessionId, SessionRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// State backed by the real SSH connector.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(SshConnector::default()))
    }

    /// State with a custom connector, for tests and embedding.
    pub fn with_connector(connector: Arc<dyn ShellConnector>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(connector)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a gateway error onto a status code and JSON body.
pub(super) fn error_reply(err: GatewayError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        GatewayError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        GatewayError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
        GatewayError::Dial(_) => (StatusCode::BAD_GATEWAY, "DIAL_ERROR"),
        GatewayError::SessionOpen(_) => (StatusCode::BAD_GATEWAY, "SESSION_OPEN_ERROR"),
        GatewayError::Stream(_) | GatewayError::SessionClosed | GatewayError::Protocol(_) => {
            (StatusCode::BAD_GATEWAY, "STREAM_ERROR")
        }
        GatewayError::Io(_) | GatewayError::LockPoisoned => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };
    (status, Json(ErrorResponse::new(code, err.to_string())))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "term-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// List all live sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let sessions = state
        .registry
        .list()
        .map_err(error_reply)?
        .iter()
        .map(|session| SessionDescriptor::from_session(session))
        .collect::<crate::Result<Vec<_>>>()
        .map_err(error_reply)?;

    Ok(Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

/// Create a new session against a remote host.
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionDescriptor>), (StatusCode, Json<ErrorResponse>)> {
    let session = state
        .registry
        .create(req.into_options())
        .await
        .map_err(error_reply)?;

    let descriptor = SessionDescriptor::from_session(&session).map_err(error_reply)?;
    Ok((StatusCode::CREATED, Json(descriptor)))
}

/// Resize a session's terminal.
pub async fn resize_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<SessionDescriptor>, (StatusCode, Json<ErrorResponse>)> {
    let id: SessionId = id.parse().map_err(error_reply)?;

    // The resize is synchronous and bounded, so a plain lookup is enough;
    // this handler's call stack keeps the session alive.
    let session = state.registry.lookup(&id).map_err(error_reply)?;
    session.resize(req.rows, req.cols).await.map_err(error_reply)?;

    let descriptor = SessionDescriptor::from_session(&session).map_err(error_reply)?;
    Ok(Json(descriptor))
}
