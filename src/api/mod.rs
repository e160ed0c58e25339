//! HTTP and WebSocket API layer.
//!
//! Handlers marshal requests into registry operations; the websocket module
//! hosts the bridge that pumps shell bytes to and from the browser.

mod handlers;
mod router;
mod types;
mod websocket;

pub use handlers::AppState;
pub use router::{create_router, create_router_with_state, serve, serve_with_state, ServerConfig};
pub use types::{
    CreateSessionRequest, ErrorResponse, ListSessionsResponse, ResizeRequest, SessionDescriptor,
};
