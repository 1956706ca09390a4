//! WebSocket handling for player connections.
//!
//! Each connection gets its own game session. The socket is split into a
//! reader task that forwards text frames to the session and a writer task
//! that serializes what the session sends back.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kibitz_domain::SessionId;

use super::sessions::{SessionHandle, SessionLease};
use crate::app::App;
use crate::use_cases::game_session::{
    close_code, GameSession, OutboundFrame, SessionEnd, SessionError,
};

/// Buffer size for per-connection outbound channel.
const CONNECTION_CHANNEL_BUFFER: usize = 64;

/// Inbound frames waiting while the computer thinks.
const INBOUND_CHANNEL_BUFFER: usize = 32;

/// How long the writer gets to flush the final frames.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<Arc<App>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, app: Arc<App>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let session_id = SessionId::new();

    tracing::info!(session_id = %session_id, "WebSocket connection established");

    // Forward session output to the socket
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(CONNECTION_CHANNEL_BUFFER);
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "Failed to serialize message");
                    }
                },
                OutboundFrame::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    // Forward socket input to the session
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_CHANNEL_BUFFER);
    let peer_gone = CancellationToken::new();
    let recv_task = {
        let peer_gone = peer_gone.clone();
        tokio::spawn(async move {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!(session_id = %session_id, "WebSocket closed by client");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
            peer_gone.cancel();
        })
    };

    let lease = match serve_session(&app, session_id, tx.clone(), inbound_rx, peer_gone).await {
        Ok(lease) => lease,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Game session could not start");
            let _ = tx
                .send(OutboundFrame::Close {
                    code: close_code::INTERNAL_ERROR,
                    reason: "Internal error".to_string(),
                })
                .await;
            None
        }
    };

    // Clean up. The session leaves the registry only once its last frames
    // are on the wire.
    drop(tx);
    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, send_task)
        .await
        .is_err()
    {
        tracing::warn!(session_id = %session_id, "Timed out flushing final frames");
    }
    recv_task.abort();
    if let Some(lease) = lease {
        lease.release();
    }

    tracing::info!(session_id = %session_id, "WebSocket connection terminated");
}

/// Run one game over an established connection. Fails only when the
/// engine cannot be started; the returned lease is `None` when the registry
/// refused the session.
async fn serve_session(
    app: &App,
    session_id: SessionId,
    outbound: mpsc::Sender<OutboundFrame>,
    inbound: mpsc::Receiver<String>,
    peer_gone: CancellationToken,
) -> Result<Option<SessionLease>, SessionError> {
    let mut session = GameSession::start(
        session_id,
        app.game.clone(),
        app.engines.as_ref(),
        app.clock.as_ref(),
        outbound,
    )
    .await?;

    let handle = SessionHandle::new(session_id, app.clock.now());
    let shutdown = handle.shutdown_token();
    let lease = match app.registry.register(handle) {
        Ok(lease) => lease,
        Err(e) => {
            session.close(&SessionEnd::Failed(e.into())).await;
            return Ok(None);
        }
    };

    let end = match session.open().await {
        Ok(()) => session.run(inbound, shutdown, peer_gone).await,
        Err(SessionError::PeerGone) => SessionEnd::PeerGone,
        Err(e) => SessionEnd::Failed(e),
    };
    session.close(&end).await;

    Ok(Some(lease))
}
