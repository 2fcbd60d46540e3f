//! Document sessions
//!
//! A [`Session`] is the host's authoritative record of one open document. The
//! [`SessionManager`] keeps at most one live session per document path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use crate::runtime::HostHandle;

/// Unique session identifier
pub type SessionId = String;

/// Generate a new unique session ID
pub fn generate_session_id() -> SessionId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Host-side state of one open document
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub document: PathBuf,
    /// Resource root handed to the view for relative links and images
    pub root_path: PathBuf,
    pub content: String,
    pub scroll_top: f64,
    pub dirty: bool,
    /// Bumped on every accepted change, view edit or external
    pub revision: u64,
    /// Revision of the most recent external replacement
    pub external_revision: u64,
    pub persisted_revision: u64,
    pub created_at: Instant,
    pub last_active: Instant,
}

impl Session {
    /// Session for content just loaded from `document`
    pub fn new(document: PathBuf, content: String) -> Self {
        let root_path = document
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let now = Instant::now();
        Self {
            id: generate_session_id(),
            document,
            root_path,
            content,
            scroll_top: 0.0,
            dirty: false,
            revision: 1,
            external_revision: 0,
            persisted_revision: 1,
            created_at: now,
            last_active: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{} is already open in session {id}", .path.display())]
    AlreadyOpen { path: PathBuf, id: SessionId },
}

struct Entry {
    id: SessionId,
    handle: Option<HostHandle>,
}

/// Registry of live sessions, keyed by document path
#[derive(Default)]
pub struct SessionManager {
    by_path: HashMap<PathBuf, Entry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `path` for a new session
    pub fn claim(&mut self, path: &Path) -> Result<SessionId, SessionError> {
        if let Some(entry) = self.by_path.get(path) {
            let live = entry.handle.as_ref().map_or(true, |h| !h.is_closed());
            if live {
                return Err(SessionError::AlreadyOpen {
                    path: path.to_path_buf(),
                    id: entry.id.clone(),
                });
            }
        }
        let id = generate_session_id();
        self.by_path.insert(
            path.to_path_buf(),
            Entry {
                id: id.clone(),
                handle: None,
            },
        );
        Ok(id)
    }

    /// Attach the running session's handle to a claimed path
    pub fn register(&mut self, path: &Path, handle: HostHandle) {
        if let Some(entry) = self.by_path.get_mut(path) {
            entry.handle = Some(handle);
        }
    }

    /// Release `path` if it is still held by session `id`
    pub fn release(&mut self, path: &Path, id: &str) -> bool {
        if self.by_path.get(path).is_some_and(|e| e.id == id) {
            self.by_path.remove(path);
            return true;
        }
        false
    }

    pub fn get(&self, path: &Path) -> Option<&HostHandle> {
        self.by_path.get(path).and_then(|e| e.handle.as_ref())
    }

    pub fn has_session(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn session_count(&self) -> usize {
        self.by_path.len()
    }

    pub fn handles(&self) -> Vec<HostHandle> {
        self.by_path.values().filter_map(|e| e.handle.clone()).collect()
    }

    /// Drop registrations whose session task has already ended
    pub fn cleanup_closed(&mut self) -> usize {
        let before = self.by_path.len();
        self.by_path
            .retain(|_, e| e.handle.as_ref().map_or(true, |h| !h.is_closed()));
        before - self.by_path.len()
    }
}
