//! Remote shell management over SSH.
//!
//! `link` dials and authenticates, `shell` owns the channel and exposes the
//! per-session stream handles, and `connector` is the seam the registry
//! creates shells through.

mod connector;
mod link;
mod shell;

pub use connector::{ShellConnector, SshConnector};
pub use link::RemoteLink;
pub use shell::{RemoteShell, ShellCommand, ShellStreams, StreamChunk, TERM_TYPE};
