//! # term-gateway
//!
//! Web-terminal gateway bridging browser WebSockets to remote SSH shells.
//!
//! A browser creates a session over the JSON API; the gateway dials the
//! remote host, authenticates, allocates a pseudo-terminal, and registers
//! the session. Attaching to the session's data endpoint upgrades to a
//! WebSocket that carries the shell's raw bytes in both directions until
//! either side ends it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use term_gateway::api::{serve_with_state, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> term_gateway::Result<()> {
//!     term_gateway::logging::try_init("info").ok();
//!
//!     let state = AppState::new();
//!     serve_with_state(ServerConfig::default(), state).await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod remote;
pub mod session;

// Re-export commonly used types
pub use error::{GatewayError, Result};
pub use remote::{RemoteLink, RemoteShell, ShellCommand, ShellConnector, ShellStreams, SshConnector};
pub use session::{Geometry, Session, SessionId, SessionOptions, SessionRegistry};
