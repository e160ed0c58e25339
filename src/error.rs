//! Error types for term-gateway.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Caller input was missing or invalid.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The remote host could not be reached or refused authentication.
    #[error("connection failed: {0}")]
    Dial(String),

    /// PTY allocation or shell start failed after a successful connection.
    #[error("shell open failed: {0}")]
    SessionOpen(String),

    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// I/O failure on a shell stream, distinct from clean end-of-stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// The session's shell has already shut down.
    #[error("session closed")]
    SessionClosed,

    /// SSH protocol error.
    #[error("ssh protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl From<russh::Error> for GatewayError {
    fn from(err: russh::Error) -> Self {
        GatewayError::Protocol(err.to_string())
    }
}

/// Convenience Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
