//! Remote shell channels and the stream handles exposed to sessions.

use std::sync::Mutex;

use russh::client::Msg;
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::link::{GatewayHandler, RemoteLink};
use crate::error::GatewayError;
use crate::Result;

/// Terminal type requested for every PTY.
pub const TERM_TYPE: &str = "xterm";

/// Depth of the command queue feeding the channel-owner task.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Depth of each outbound byte-stream queue. Bounded so a slow consumer
/// stalls the owner task instead of growing memory; flow control then falls
/// back to SSH channel windowing.
const STREAM_QUEUE_DEPTH: usize = 32;

/// One chunk read from a shell stream, or the stream's terminal error.
/// Clean end-of-stream is the channel closing, never an `Err`.
pub type StreamChunk = std::result::Result<Vec<u8>, GatewayError>;

/// Commands served by the channel-owner task.
#[derive(Debug)]
pub enum ShellCommand {
    /// Bytes for the shell's input stream.
    Data(Vec<u8>),
    /// Change the PTY geometry; the ack carries the remote's answer.
    Resize {
        rows: u16,
        cols: u16,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Shut the shell down.
    Close,
}

/// The read ends of a shell's output and error-output streams.
pub struct ShellStreams {
    pub output: mpsc::Receiver<StreamChunk>,
    pub errors: mpsc::Receiver<StreamChunk>,
}

/// Session-facing handle to a running remote shell.
///
/// Input and control flow through the command queue; output and error bytes
/// arrive on stream receivers that can be taken exactly once, which is what
/// limits a session to a single bridge attachment.
pub struct RemoteShell {
    commands: mpsc::Sender<ShellCommand>,
    streams: Mutex<Option<ShellStreams>>,
}

impl RemoteShell {
    /// Wrap the endpoints of a shell whose owner task is already running.
    pub fn new(
        commands: mpsc::Sender<ShellCommand>,
        output: mpsc::Receiver<StreamChunk>,
        errors: mpsc::Receiver<StreamChunk>,
    ) -> Self {
        Self {
            commands,
            streams: Mutex::new(Some(ShellStreams { output, errors })),
        }
    }

    /// Write bytes to the shell's input stream.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.commands
            .send(ShellCommand::Data(bytes))
            .await
            .map_err(|_| GatewayError::SessionClosed)
    }

    /// Ask the remote to change the PTY geometry and wait for its answer.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let (ack, acked) = oneshot::channel();
        self.commands
            .send(ShellCommand::Resize { rows, cols, ack })
            .await
            .map_err(|_| GatewayError::SessionClosed)?;
        acked.await.map_err(|_| GatewayError::SessionClosed)?
    }

    /// Take both stream read ends in one step. Returns `None` once taken,
    /// so two racing attachments cannot each walk away with one stream.
    pub fn take_streams(&self) -> Option<ShellStreams> {
        self.streams.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Best-effort shutdown. Tolerates an already-closed shell; the owner
    /// task also stops when the last command sender is dropped, so a full
    /// queue cannot leak the channel.
    pub fn close(&self) {
        let _ = self.commands.try_send(ShellCommand::Close);
    }
}

impl RemoteLink {
    /// Open a session channel, request a PTY, and start an interactive shell.
    ///
    /// Every intermediate failure closes the partially opened channel and
    /// the connection before the error is returned.
    pub async fn open_shell(mut self, rows: u16, cols: u16) -> Result<RemoteShell> {
        let mut channel = match self.handle.channel_open_session().await {
            Ok(channel) => channel,
            Err(e) => {
                self.shutdown().await;
                return Err(GatewayError::SessionOpen(e.to_string()));
            }
        };

        // Server-side echo stays on: the browser renders, it does not echo.
        if let Err(e) = channel
            .request_pty(
                false,
                TERM_TYPE,
                cols as u32,
                rows as u32,
                0,
                0,
                &[(Pty::ECHO, 1)],
            )
            .await
        {
            let _ = channel.eof().await;
            self.shutdown().await;
            return Err(GatewayError::SessionOpen(format!(
                "pty request failed: {}",
                e
            )));
        }

        if let Err(e) = channel.request_shell(false).await {
            let _ = channel.eof().await;
            self.shutdown().await;
            return Err(GatewayError::SessionOpen(format!(
                "shell start failed: {}",
                e
            )));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (out_tx, out_rx) = mpsc::channel(STREAM_QUEUE_DEPTH);
        let (err_tx, err_rx) = mpsc::channel(STREAM_QUEUE_DEPTH);

        let label = format!("{}@{}:{}", self.username, self.host, self.port);
        tokio::spawn(run_shell_channel(
            self.handle,
            channel,
            cmd_rx,
            out_tx,
            err_tx,
            label,
        ));

        Ok(RemoteShell::new(cmd_tx, out_rx, err_rx))
    }

    async fn shutdown(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "session closed", "")
            .await;
    }
}

/// Owns the SSH channel and connection for one shell: serves commands,
/// fans channel messages out to the stream queues, and disconnects on the
/// way out. Stops when either side closes or when the command channel's
/// last sender is dropped.
async fn run_shell_channel(
    handle: russh::client::Handle<GatewayHandler>,
    mut channel: Channel<Msg>,
    mut commands: mpsc::Receiver<ShellCommand>,
    output: mpsc::Sender<StreamChunk>,
    errors: mpsc::Sender<StreamChunk>,
    label: String,
) {
    debug!("shell channel running for {}", label);

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(ShellCommand::Data(bytes)) => {
                    if let Err(e) = channel.data(&bytes[..]).await {
                        let _ = output
                            .send(Err(GatewayError::Stream(format!(
                                "input write failed: {}",
                                e
                            ))))
                            .await;
                        break;
                    }
                }
                Some(ShellCommand::Resize { rows, cols, ack }) => {
                    let result = channel
                        .window_change(cols as u32, rows as u32, 0, 0)
                        .await
                        .map_err(|e| {
                            GatewayError::Stream(format!("window change failed: {}", e))
                        });
                    let _ = ack.send(result);
                }
                // Close order: input first, then the channel and the
                // connection on the way out.
                Some(ShellCommand::Close) | None => {
                    let _ = channel.eof().await;
                    break;
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    if output.send(Ok(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    if errors.send(Ok(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("shell for {} exited with status {}", label, exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    let _ = handle
        .disconnect(Disconnect::ByApplication, "session closed", "")
        .await;
    info!("shell channel closed for {}", label);
}
