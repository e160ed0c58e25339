//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Session, SessionOptions};

/// Request to create a new session.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateSessionRequest {
    /// Remote host to dial.
    #[serde(default)]
    pub host: String,
    /// Remote port; omit or 0 for the standard SSH port.
    #[serde(default)]
    pub port: u16,
    /// Login username.
    #[serde(default)]
    pub user: String,
    /// Login password.
    #[serde(default)]
    pub password: String,
    /// Initial terminal rows; omit or 0 for the fallback geometry.
    #[serde(default)]
    pub rows: u16,
    /// Initial terminal columns; omit or 0 for the fallback geometry.
    #[serde(default)]
    pub cols: u16,
}

impl CreateSessionRequest {
    pub fn into_options(self) -> SessionOptions {
        SessionOptions {
            host: self.host,
            port: self.port,
            username: self.user,
            password: self.password,
            rows: self.rows,
            cols: self.cols,
        }
    }
}

/// Request to resize a session's terminal.
#[derive(Debug, Clone, Deserialize)]
pub struct ResizeRequest {
    pub rows: u16,
    pub cols: u16,
}

/// Session descriptor returned by list, create, and resize.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub term_type: String,
    pub rows: u16,
    pub cols: u16,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub since: DateTime<Utc>,
}

impl SessionDescriptor {
    pub fn from_session(session: &Session) -> crate::Result<Self> {
        let geometry = session.geometry()?;
        Ok(Self {
            id: session.id().to_string(),
            term_type: session.term_type().to_string(),
            rows: geometry.rows,
            cols: geometry.cols,
            host: session.host().to_string(),
            port: session.port(),
            user: session.username().to_string(),
            since: session.created_at(),
        })
    }
}

/// List sessions response.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// Total number of live sessions.
    pub count: usize,
    /// Session descriptors, in unspecified order.
    pub sessions: Vec<SessionDescriptor>,
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new("SESSION_NOT_FOUND", format!("session '{}' not found", id))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}
