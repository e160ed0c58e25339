//! Session management module.
//!
//! Provides the session identifier, the session model, and the process-wide
//! registry that arbitrates shared session lifecycle.

mod id;
mod registry;

pub use id::SessionId;
pub use registry::{
    Geometry, Session, SessionOptions, SessionRegistry, DEFAULT_COLS, DEFAULT_PORT, DEFAULT_ROWS,
};
