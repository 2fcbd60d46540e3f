//! WebSocket transport for md-web
//!
//! Serves editor views over WebSocket, one document per connection.

pub mod connection;
pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::runtime::{HostDeps, HostOptions};
use crate::session::SessionManager;

pub use connection::handle_connection;
pub use protocol::{parse_document_from_uri, validate_origin};

/// Shared by every connection
pub struct ServerState {
    pub sessions: RwLock<SessionManager>,
    pub deps: HostDeps,
    pub options: HostOptions,
}

impl ServerState {
    pub fn new(deps: HostDeps, options: HostOptions) -> Self {
        Self {
            sessions: RwLock::new(SessionManager::new()),
            deps,
            options,
        }
    }

    /// Filesystem-backed state built from `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(HostDeps::filesystem(config), HostOptions::from_config(config))
    }

    /// Close every live session and wait for its final write
    pub async fn close_all(&self, grace: Duration) -> usize {
        let handles = self.sessions.read().await.handles();
        for handle in &handles {
            handle.close();
        }
        for handle in &handles {
            let mut status = handle.watch_status();
            if tokio::time::timeout(grace, status.wait_for(|s| s.closed))
                .await
                .is_err()
            {
                tracing::warn!(session_id = %handle.id(), "Session did not close in time");
            }
        }
        handles.len()
    }
}

/// Bind and serve WebSocket connections
pub async fn serve(state: Arc<ServerState>, bind: &str, port: u16) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "WebSocket server listening");
    serve_listener(listener, state).await
}

/// Accept loop over an already bound listener
pub async fn serve_listener(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    // Spawn cleanup task for registrations left behind by ended sessions
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = cleanup_state.sessions.write().await.cleanup_closed();
            if removed > 0 {
                tracing::info!(removed, "Cleaned up stale sessions");
            }
        }
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::warn!(peer = %peer, error = %e, "Connection ended with error");
            }
        });
    }
}
