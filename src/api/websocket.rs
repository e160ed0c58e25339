//! The bridge: pumps bytes between a session's shell streams and one
//! attached WebSocket.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::handlers::AppState;
use super::types::ErrorResponse;
use crate::remote::StreamChunk;
use crate::session::{Session, SessionId};

/// Upper bound on bytes per outbound frame.
const FORWARD_CHUNK: usize = 8192;

/// Depth of the outbound frame queue. Bounded so a slow browser blocks the
/// pumps (and through them the shell's reads) instead of growing memory.
const SEND_QUEUE_DEPTH: usize = 64;

/// WebSocket upgrade handler for attaching to a session's byte streams.
pub async fn attach_session(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    // Resolve before upgrading: an unknown id fails the plain HTTP request
    // and starts no pumps.
    let session_id: SessionId = match id.parse() {
        Ok(session_id) => session_id,
        Err(_) => return not_found(&id),
    };
    if state.registry.lookup(&session_id).is_err() {
        return not_found(&id);
    }

    ws.on_upgrade(move |socket| bridge_session(socket, state, session_id))
        .into_response()
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::session_not_found(id)),
    )
        .into_response()
}

/// Run one bridge attachment to completion.
async fn bridge_session(mut socket: WebSocket, state: AppState, id: SessionId) {
    let session = match state.registry.acquire(&id) {
        Ok(session) => session,
        Err(err) => {
            // The session went away between upgrade and attach.
            let _ = socket
                .send(Message::Text(format!("\r\nError: {}", err).into()))
                .await;
            return;
        }
    };

    let Some(streams) = session.take_streams() else {
        warn!("rejecting second attachment to session {}", id);
        let _ = socket
            .send(Message::Text(
                format!("\r\nError: session {} is already attached", id).into(),
            ))
            .await;
        state.registry.release(&id);
        return;
    };

    info!("linking session {} ({})", id, session.name());

    let (sink, stream) = socket.split();
    let (frames_tx, frames_rx) = mpsc::channel::<Message>(SEND_QUEUE_DEPTH);
    let writer = tokio::spawn(write_frames(sink, frames_rx));

    // Three pumps race; the first to finish wins the select and cancels the
    // other two at their next await point.
    tokio::select! {
        _ = forward_stream(streams.output, frames_tx.clone()) => {}
        _ = forward_stream(streams.errors, frames_tx.clone()) => {}
        _ = relay_inbound(stream, Arc::clone(&session), frames_tx.clone()) => {}
    }

    // The single teardown path, reached exactly once per attachment: drop
    // the bridge's hold and the creation hold (the attachment is the
    // session's terminal consumer), then let the writer drain and close.
    info!("unlinking session {} ({})", id, session.name());
    state.registry.release(&id);
    state.registry.release(&id);
    drop(frames_tx);
    let _ = writer.await;
}

/// Own the sink: send queued frames until the queue closes or the socket
/// dies, then close the socket.
async fn write_frames(mut sink: SplitSink<WebSocket, Message>, mut frames: mpsc::Receiver<Message>) {
    while let Some(frame) = frames.recv().await {
        if sink.send(frame).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Forward one shell stream to the browser, preserving byte order within
/// the stream. Exits on clean end-of-stream (silently), on a terminal
/// stream error (after a diagnostic), or when the frame queue closes.
async fn forward_stream(mut stream: mpsc::Receiver<StreamChunk>, frames: mpsc::Sender<Message>) {
    while let Some(chunk) = stream.recv().await {
        match chunk {
            Ok(bytes) => {
                // An empty read means no data yet, not end-of-stream.
                if bytes.is_empty() {
                    continue;
                }
                for part in bytes.chunks(FORWARD_CHUNK) {
                    if frames
                        .send(Message::Binary(part.to_vec().into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = frames
                    .send(Message::Text(format!("\r\nError: {}", err).into()))
                    .await;
                return;
            }
        }
    }
}

/// Relay inbound frames to the shell's input stream. Exits on a clean close
/// (silently), on transport failure, or on an input write failure (after a
/// best-effort diagnostic).
async fn relay_inbound(
    mut stream: SplitStream<WebSocket>,
    session: Arc<Session>,
    frames: mpsc::Sender<Message>,
) {
    while let Some(next) = stream.next().await {
        let bytes: Vec<u8> = match next {
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Ping(data)) => {
                let _ = frames.send(Message::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => continue,
            Err(_) => return,
        };
        if bytes.is_empty() {
            continue;
        }
        if let Err(err) = session.write(bytes).await {
            let _ = frames
                .send(Message::Text(format!("\r\nError: {}", err).into()))
                .await;
            return;
        }
    }
}
