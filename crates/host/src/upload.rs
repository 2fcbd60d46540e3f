//! Host side of the upload relay
//!
//! Pasted images arrive as `img` requests. Each one is stored off the session
//! loop; the outcome comes back as [`HostEvent::UploadFinished`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use md_web_protocol::UploadRequest;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::persist::StoreError;
use crate::runtime::HostEvent;

/// Stores attachment bytes and returns a URI the document can reference
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, document: &Path, mime: &str, data: Vec<u8>) -> Result<String, StoreError>;
}

/// Writes attachments into a directory next to the document
#[derive(Debug, Clone)]
pub struct FsAttachmentStore {
    assets_dir: String,
}

impl FsAttachmentStore {
    pub fn new(assets_dir: impl Into<String>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    fn directory(&self, document: &Path) -> PathBuf {
        document
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.assets_dir)
    }
}

pub fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/svg+xml" => Some("svg"),
        _ => mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first().copied()),
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn store(&self, document: &Path, mime: &str, data: Vec<u8>) -> Result<String, StoreError> {
        if data.is_empty() {
            return Err(StoreError::Empty);
        }
        if !mime.starts_with("image/") {
            return Err(StoreError::UnsupportedMime(mime.to_string()));
        }
        let ext = extension_for(mime).ok_or_else(|| StoreError::UnsupportedMime(mime.to_string()))?;

        let dir = self.directory(document);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let name = format!("{}.{ext}", Uuid::new_v4().simple());
        let path = dir.join(&name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        Ok(format!("{}/{name}", self.assets_dir.trim_end_matches('/')))
    }
}

/// Store `request` on its own task and report back through `events`
pub fn spawn_store(
    store: Arc<dyn AttachmentStore>,
    document: PathBuf,
    request: UploadRequest,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    let UploadRequest { token, mime, data } = request;
    tokio::spawn(async move {
        let size = data.len();
        let result = store
            .store(&document, &mime, data)
            .await
            .map_err(|e| e.to_string());
        match &result {
            Ok(uri) => debug!(token, size, uri = %uri, "attachment stored"),
            Err(reason) => warn!(token, mime = %mime, "attachment rejected: {}", reason),
        }
        let _ = events.send(HostEvent::UploadFinished { token, result });
    });
}
