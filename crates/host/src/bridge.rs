//! Document Bridge
//!
//! Applies view edits and external changes to the [`Session`] in a single
//! order, decided by the session's own revision counter.

use md_web_protocol::{EditPayload, EditorConfig, OpenPayload, UpdatePayload};
use tracing::{debug, info};

use crate::persist::Snapshot;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Accepted { revision: u64 },
    /// Same content as the session already holds
    Unchanged,
    /// Based on content older than the last external replacement
    Stale { base: u64, external: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalOrigin {
    Undo,
    Redo,
    Reload,
}

impl ExternalOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Reload => "reload",
        }
    }
}

#[derive(Debug)]
pub struct DocumentBridge {
    session: Session,
}

impl DocumentBridge {
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.session.revision,
            content: self.session.content.clone(),
        }
    }

    /// Apply an edit coming from the view
    pub fn accept_edit(&mut self, edit: EditPayload) -> EditOutcome {
        let session = &mut self.session;
        session.touch();

        if let Some(base) = edit.base_revision() {
            if base < session.external_revision {
                debug!(
                    session_id = %session.id,
                    base,
                    external = session.external_revision,
                    "rejecting stale edit"
                );
                return EditOutcome::Stale {
                    base,
                    external: session.external_revision,
                };
            }
        }

        if edit.content() == session.content {
            return EditOutcome::Unchanged;
        }

        session.content = edit.into_content();
        session.revision += 1;
        session.dirty = true;
        EditOutcome::Accepted {
            revision: session.revision,
        }
    }

    /// Replace the content from the host side; returns the update to push
    pub fn apply_external(&mut self, content: String, origin: ExternalOrigin) -> Option<UpdatePayload> {
        let session = &mut self.session;
        if content == session.content {
            return None;
        }

        session.content = content;
        session.revision += 1;
        session.external_revision = session.revision;
        session.dirty = true;
        info!(
            session_id = %session.id,
            revision = session.revision,
            origin = origin.as_str(),
            "external change"
        );

        Some(UpdatePayload {
            content: session.content.clone(),
            revision: session.revision,
        })
    }

    pub fn record_scroll(&mut self, top: f64) {
        if top.is_finite() {
            self.session.scroll_top = top.max(0.0);
        }
    }

    /// Returns true when this write brought the session fully up to date
    pub fn mark_persisted(&mut self, revision: u64) -> bool {
        let session = &mut self.session;
        session.persisted_revision = session.persisted_revision.max(revision);
        if session.persisted_revision >= session.revision {
            session.dirty = false;
        }
        !session.dirty
    }

    pub fn open_payload(&self, config: EditorConfig) -> OpenPayload {
        OpenPayload {
            content: self.session.content.clone(),
            root_path: self.session.root_path.to_string_lossy().into_owned(),
            config,
            scroll_top: self.session.scroll_top,
            revision: self.session.revision,
        }
    }
}
