//! Authenticated SSH connections to remote hosts.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::keys::PublicKey;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::session::SessionOptions;
use crate::Result;

/// russh event handler carrying the host-key policy.
///
/// The gateway carries no known-hosts store. With
/// `accept_unverified_hosts` the server's key is accepted and a warning is
/// logged per dial (the trusted-network tradeoff of the original gateway);
/// without it every connection is refused.
pub(super) struct GatewayHandler {
    host: String,
    port: u16,
    accept_unverified_hosts: bool,
}

impl client::Handler for GatewayHandler {
    type Error = GatewayError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool> {
        if self.accept_unverified_hosts {
            warn!(
                "accepting unverified host key for {}:{}",
                self.host, self.port
            );
            Ok(true)
        } else {
            Err(GatewayError::Dial(format!(
                "host key verification enabled but no known-hosts store is available for {}:{}",
                self.host, self.port
            )))
        }
    }
}

/// One authenticated connection to a remote host.
///
/// Each session owns its own link; closing the session's shell also tears
/// the link down.
pub struct RemoteLink {
    pub(super) handle: client::Handle<GatewayHandler>,
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) username: String,
}

impl RemoteLink {
    /// Open a transport connection and authenticate with a password.
    pub async fn dial(
        options: &SessionOptions,
        connect_timeout: Duration,
        accept_unverified_hosts: bool,
    ) -> Result<Self> {
        let addr = format!("{}:{}", options.host, options.port);
        debug!("dialing {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| GatewayError::Dial(format!("failed to resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| GatewayError::Dial(format!("no address found for {}", addr)))?;

        let config = client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };
        let handler = GatewayHandler {
            host: options.host.clone(),
            port: options.port,
            accept_unverified_hosts,
        };

        let mut handle = tokio::time::timeout(
            connect_timeout,
            client::connect(Arc::new(config), socket_addr, handler),
        )
        .await
        .map_err(|_| GatewayError::Dial(format!("connection to {} timed out", addr)))?
        .map_err(|e| GatewayError::Dial(e.to_string()))?;

        let auth = handle
            .authenticate_password(&options.username, &options.password)
            .await
            .map_err(|e| GatewayError::Dial(e.to_string()))?;
        if !auth.success() {
            return Err(GatewayError::Dial(
                "authentication rejected by server".into(),
            ));
        }

        info!("authenticated to {} as {}", addr, options.username);
        Ok(Self {
            handle,
            host: options.host.clone(),
            port: options.port,
            username: options.username.clone(),
        })
    }
}
