//! WebSocket connection handling
//!
//! Each connection is one view of one document: the handshake picks the
//! document, a session is started for it, and binary frames are bridged
//! between the socket and the session's link.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

use md_web_protocol::{link_pair, Link, RateGate, TokenBucket};

use crate::runtime::{load_session, spawn_session};

use super::protocol::{parse_document_from_uri, validate_origin};
use super::ServerState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection metadata extracted during WebSocket handshake
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub document: Option<PathBuf>,
    pub origin: Option<String>,
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = http::Response::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Handle a single WebSocket connection
pub async fn handle_connection<S>(stream: S, state: Arc<ServerState>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let info = Arc::new(std::sync::Mutex::new(ConnectionInfo::default()));
    let info_clone = info.clone();

    let callback = move |req: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        // No origin header = same-origin request (OK)
        if let Some(origin) = req.headers().get("origin") {
            let origin = origin.to_str().unwrap_or_default();
            if !validate_origin(origin) {
                tracing::warn!(origin, "Rejected connection from invalid origin");
                return Err(reject(StatusCode::FORBIDDEN, "origin not allowed"));
            }
        }

        let Some(document) = parse_document_from_uri(&req.uri().to_string()) else {
            return Err(reject(StatusCode::BAD_REQUEST, "missing ?doc="));
        };

        let mut info = info_clone
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        info.origin = req
            .headers()
            .get("origin")
            .and_then(|o| o.to_str().ok())
            .map(str::to_string);
        info.document = Some(document);
        Ok(response)
    };

    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;

    let info = info
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    let Some(requested) = info.document else {
        anyhow::bail!("handshake finished without a document");
    };
    let document = tokio::fs::canonicalize(&requested).await.unwrap_or(requested);

    // One session per document
    let claimed = state.sessions.write().await.claim(&document);
    let session_id = match claimed {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(document = %document.display(), "{}", e);
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: e.to_string().into(),
                }))
                .await;
            return Err(e.into());
        }
    };

    let mut session = match load_session(&*state.deps.documents, document.clone()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(document = %document.display(), error = %e, "Failed to open document");
            state.sessions.write().await.release(&document, &session_id);
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Error,
                    reason: "cannot read document".into(),
                }))
                .await;
            return Err(e.into());
        }
    };
    session.id.clone_from(&session_id);

    let (host_link, view_link) = link_pair();
    let (handle, task) = spawn_session(host_link, session, state.deps.clone(), state.options.clone());
    state.sessions.write().await.register(&document, handle.clone());

    tracing::info!(
        session_id = %session_id,
        document = %document.display(),
        origin = ?info.origin,
        "Session connected"
    );

    let Link {
        tx: to_host,
        rx: mut from_host,
    } = view_link;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Rate limiter: 1000 burst, 100/sec sustained; excess frames wait
    let mut gate = TokenBucket::default_ws();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > HEARTBEAT_TIMEOUT {
                    tracing::warn!(
                        session_id = %session_id,
                        elapsed_secs = last_activity.elapsed().as_secs(),
                        "Session heartbeat timeout"
                    );
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    tracing::debug!(session_id = %session_id, "Ping send failed");
                    break;
                }
            }

            frame = from_host.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!(session_id = %session_id, "Session ended");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if ws_tx.send(Message::Binary(frame)).await.is_err() {
                    tracing::warn!(session_id = %session_id, "Send failed, closing");
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        last_activity = Instant::now();
                        // Over the limit the frame is held back, never dropped
                        while !gate.admit(Instant::now()) {
                            let wait = gate.wait_time(Instant::now());
                            tracing::debug!(session_id = %session_id, ?wait, "Rate limit reached, delaying frame");
                            tokio::time::sleep(wait).await;
                        }
                        if to_host.send(data).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Dropping the link ends the session loop, which flushes pending writes
    drop(to_host);
    handle.close();
    if let Err(e) = task.await {
        tracing::error!(session_id = %session_id, error = %e, "Session task failed");
    }
    state.sessions.write().await.release(&document, &session_id);

    tracing::info!(session_id = %session_id, "Client disconnected");
    Ok(())
}
