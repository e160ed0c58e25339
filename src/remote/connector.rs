//! The connector seam between the registry and the SSH layer.

use std::time::Duration;

use async_trait::async_trait;

use super::link::RemoteLink;
use super::shell::RemoteShell;
use crate::session::SessionOptions;
use crate::Result;

/// Opens remote shells for the session registry.
///
/// The registry only knows this trait, which is what lets tests drive the
/// full session lifecycle against a simulated remote.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Dial the remote host described by `options` and start an interactive
    /// shell with the requested geometry. `options` are already validated
    /// and normalized.
    async fn connect(&self, options: &SessionOptions) -> Result<RemoteShell>;
}

/// Opens real shells over SSH with password authentication.
#[derive(Debug, Clone)]
pub struct SshConnector {
    /// Deadline covering TCP connect, handshake, and authentication.
    pub connect_timeout: Duration,
    /// Accept any server host key. See the handler in `link.rs`.
    pub accept_unverified_hosts: bool,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            accept_unverified_hosts: true,
        }
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn connect(&self, options: &SessionOptions) -> Result<RemoteShell> {
        let link = RemoteLink::dial(
            options,
            self.connect_timeout,
            self.accept_unverified_hosts,
        )
        .await?;
        link.open_shell(options.rows, options.cols).await
    }
}
