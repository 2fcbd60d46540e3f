//! Document persistence
//!
//! Edits are handed to a [`Persister`] through a `watch` cell. The cell always
//! holds the newest snapshot, so a burst of edits collapses into one write
//! without ever dropping the latest content.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::runtime::HostEvent;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported mime type {0}")]
    UnsupportedMime(String),
    #[error("empty upload")]
    Empty,
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes whole documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, path: &Path) -> Result<String, StoreError>;
    async fn write(&self, path: &Path, content: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocumentStore;

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn load(&self, path: &Path) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            // A new document starts empty and is created on first save
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PersistPolicy {
    pub debounce: Duration,
    pub attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Background writer for one document
pub struct Persister {
    latest: watch::Sender<Snapshot>,
    flush: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Persister {
    /// `initial` is what the store already holds
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        path: PathBuf,
        initial: Snapshot,
        policy: PersistPolicy,
        events: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        let written = initial.revision;
        let (latest, rx) = watch::channel(initial);
        let flush = Arc::new(Notify::new());
        let worker = Worker {
            store,
            path,
            policy,
            events,
            rx,
            flush: flush.clone(),
            written,
        };
        Self {
            latest,
            flush,
            task: tokio::spawn(worker.run()),
        }
    }

    pub fn submit(&self, snapshot: Snapshot) {
        self.latest.send_if_modified(|current| {
            if snapshot.revision > current.revision {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }

    /// Skip the debounce and write the latest snapshot now
    pub fn flush_now(&self) {
        self.flush.notify_one();
    }

    /// Write anything outstanding and stop
    pub async fn close(self) {
        let Self { latest, task, .. } = self;
        drop(latest);
        if let Err(e) = task.await {
            error!("persister task failed: {}", e);
        }
    }
}

struct Worker {
    store: Arc<dyn DocumentStore>,
    path: PathBuf,
    policy: PersistPolicy,
    events: mpsc::UnboundedSender<HostEvent>,
    rx: watch::Receiver<Snapshot>,
    flush: Arc<Notify>,
    written: u64,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let (mut open, forced) = tokio::select! {
                changed = self.rx.changed() => (changed.is_ok(), false),
                () = self.flush.notified() => (true, true),
            };

            // Restart the quiet period on every new snapshot
            while open && !forced {
                tokio::select! {
                    () = tokio::time::sleep(self.policy.debounce) => break,
                    () = self.flush.notified() => break,
                    changed = self.rx.changed() => open = changed.is_ok(),
                }
            }

            self.write_latest().await;
            if !open {
                debug!(path = %self.path.display(), "persister closed");
                return;
            }
        }
    }

    async fn write_latest(&mut self) {
        let snapshot = self.rx.borrow_and_update().clone();
        if snapshot.revision <= self.written {
            return;
        }

        let mut attempt = 1;
        loop {
            match self.store.write(&self.path, &snapshot.content).await {
                Ok(()) => {
                    self.written = snapshot.revision;
                    info!(path = %self.path.display(), revision = snapshot.revision, "document saved");
                    let _ = self.events.send(HostEvent::Persisted {
                        revision: snapshot.revision,
                    });
                    return;
                }
                Err(e) if attempt < self.policy.attempts => {
                    warn!(path = %self.path.display(), attempt, "save failed, retrying: {}", e);
                    tokio::time::sleep(self.policy.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(path = %self.path.display(), revision = snapshot.revision, "save failed: {}", e);
                    let _ = self.events.send(HostEvent::PersistFailed {
                        revision: snapshot.revision,
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }
    }
}
