//! Host session loop
//!
//! One task per open document owns the [`HostContext`]. Frames from the view
//! and host-side events (external changes, finished uploads, completed writes)
//! are handled one at a time, in arrival order.

use std::future::Future;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use md_web_protocol::{
    Channel, CommandName, Dispatcher, EditPayload, EditorConfig, FormatKind, FormatRequest, Link, Side,
    UploadFailure, UploadRequest, UploadResolved,
};

use crate::bridge::{DocumentBridge, EditOutcome, ExternalOrigin};
use crate::commands::host_table;
use crate::config::Config;
use crate::persist::{DocumentStore, FsDocumentStore, PersistPolicy, Persister, StoreError};
use crate::services::{HostServices, TracingServices};
use crate::session::{Session, SessionId};
use crate::upload::{spawn_store, AttachmentStore, FsAttachmentStore};

#[derive(Debug)]
pub enum HostEvent {
    /// Content replaced on the host side (undo, redo, reload from disk)
    External { content: String, origin: ExternalOrigin },
    /// The view became visible again; resend the last scroll offset
    Reveal,
    Format(FormatKind),
    UploadFinished { token: u64, result: Result<String, String> },
    Persisted { revision: u64 },
    PersistFailed { revision: u64, reason: String },
    Close,
}

/// What a status bar needs to know about a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub revision: u64,
    pub persisted_revision: u64,
    pub dirty: bool,
    pub words: usize,
    pub view_ready: bool,
    pub closed: bool,
}

/// Cloneable handle to a running session
#[derive(Debug, Clone)]
pub struct HostHandle {
    id: SessionId,
    events: mpsc::UnboundedSender<HostEvent>,
    status: watch::Receiver<SessionStatus>,
}

impl HostHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: HostEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn external(&self, content: impl Into<String>, origin: ExternalOrigin) -> bool {
        self.send(HostEvent::External {
            content: content.into(),
            origin,
        })
    }

    pub fn reveal(&self) -> bool {
        self.send(HostEvent::Reveal)
    }

    pub fn format(&self, kind: FormatKind) -> bool {
        self.send(HostEvent::Format(kind))
    }

    pub fn close(&self) -> bool {
        self.send(HostEvent::Close)
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Collaborators a session talks to
#[derive(Clone)]
pub struct HostDeps {
    pub documents: Arc<dyn DocumentStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub services: Arc<dyn HostServices>,
}

impl HostDeps {
    /// Local files, with service requests only logged
    pub fn filesystem(config: &Config) -> Self {
        Self {
            documents: Arc::new(FsDocumentStore),
            attachments: Arc::new(FsAttachmentStore::new(config.session.assets_dir.clone())),
            services: Arc::new(TracingServices),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    pub editor: EditorConfig,
    pub persist: PersistPolicy,
}

impl HostOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            editor: config.editor.to_editor_config(),
            persist: PersistPolicy {
                debounce: config.persist_debounce(),
                attempts: config.session.persist_attempts.max(1),
                ..PersistPolicy::default()
            },
        }
    }
}

/// Read `document` and build its session
pub async fn load_session(documents: &dyn DocumentStore, document: PathBuf) -> Result<Session, StoreError> {
    let content = documents.load(&document).await?;
    Ok(Session::new(document, content))
}

pub struct HostContext {
    pub(crate) bridge: DocumentBridge,
    pub(crate) channel: Channel,
    pub(crate) events: mpsc::UnboundedSender<HostEvent>,
    pub(crate) persister: Persister,
    pub(crate) deps: HostDeps,
    pub(crate) editor: EditorConfig,
    status: watch::Sender<SessionStatus>,
}

impl HostContext {
    pub(crate) fn id(&self) -> &str {
        &self.bridge.session().id
    }

    pub(crate) fn document(&self) -> PathBuf {
        self.bridge.session().document.clone()
    }

    pub(crate) fn emit<P: serde::Serialize + ?Sized>(&mut self, name: CommandName, payload: &P) {
        if let Err(e) = self.channel.emit(name.clone(), payload) {
            warn!(session_id = %self.id(), command = %name, "emit failed: {}", e);
        }
    }

    /// Answer `init`: send the document, then release anything queued for the view
    pub(crate) fn greet(&mut self) {
        let open = self.bridge.open_payload(self.editor.clone());
        let revision = open.revision;
        self.emit(CommandName::Open, &open);
        match self.channel.mark_peer_ready() {
            Ok(flushed) => info!(session_id = %self.id(), revision, flushed, "view ready"),
            Err(e) => warn!(session_id = %self.id(), "view went away during handshake: {}", e),
        }
        self.publish_status();
    }

    pub(crate) fn accept_edit(&mut self, edit: EditPayload, force: bool) {
        match self.bridge.accept_edit(edit) {
            EditOutcome::Accepted { revision } => {
                debug!(session_id = %self.id(), revision, "edit accepted");
                self.persister.submit(self.bridge.snapshot());
            }
            EditOutcome::Unchanged => trace!(session_id = %self.id(), "edit without changes"),
            EditOutcome::Stale { base, external } => {
                warn!(
                    session_id = %self.id(),
                    base,
                    external,
                    "dropping edit made before an external change"
                );
            }
        }
        if force {
            self.persister.flush_now();
        }
        self.publish_status();
    }

    pub(crate) fn store_upload(&self, request: UploadRequest) {
        debug!(session_id = %self.id(), token = request.token, mime = %request.mime, "upload requested");
        spawn_store(
            self.deps.attachments.clone(),
            self.document(),
            request,
            self.events.clone(),
        );
    }

    /// Run a service call off the loop; failures are logged
    pub(crate) fn spawn_service<F>(&self, service: &'static str, call: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.id().to_string();
        tokio::spawn(async move {
            if let Err(e) = call.await {
                warn!(session_id = %id, service, "service call failed: {:#}", e);
            }
        });
    }

    fn publish_status(&self) {
        let session = self.bridge.session();
        let status = SessionStatus {
            revision: session.revision,
            persisted_revision: session.persisted_revision,
            dirty: session.dirty,
            words: session.word_count(),
            view_ready: self.channel.peer_ready(),
            closed: false,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Break once the session has been asked to close
    fn handle_event(&mut self, event: HostEvent) -> ControlFlow<()> {
        match event {
            HostEvent::External { content, origin } => {
                if let Some(update) = self.bridge.apply_external(content, origin) {
                    self.persister.submit(self.bridge.snapshot());
                    self.emit(CommandName::Update, &update);
                }
            }
            HostEvent::Reveal => {
                let top = self.bridge.session().scroll_top;
                self.emit(CommandName::RestoreScrollPosition, &top);
            }
            HostEvent::Format(kind) => {
                self.emit(CommandName::Format, &FormatRequest::new(kind));
            }
            HostEvent::UploadFinished { token, result } => match result {
                Ok(uri) => self.emit(CommandName::Uploaded, &UploadResolved { token, uri }),
                Err(reason) => self.emit(CommandName::UploadFailed, &UploadFailure { token, reason }),
            },
            HostEvent::Persisted { revision } => {
                if self.bridge.mark_persisted(revision) {
                    debug!(session_id = %self.id(), revision, "session clean");
                }
            }
            HostEvent::PersistFailed { revision, reason } => {
                warn!(session_id = %self.id(), revision, "document left unsaved: {}", reason);
            }
            HostEvent::Close => return ControlFlow::Break(()),
        }
        self.publish_status();
        ControlFlow::Continue(())
    }
}

pub struct Host {
    ctx: HostContext,
    table: Dispatcher<HostContext>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedReceiver<HostEvent>,
}

impl Host {
    /// Must be called inside a tokio runtime; the persister starts immediately
    pub fn new(link: Link, session: Session, deps: HostDeps, options: HostOptions) -> (Self, HostHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let bridge = DocumentBridge::new(session);
        let persister = Persister::spawn(
            deps.documents.clone(),
            bridge.session().document.clone(),
            bridge.snapshot(),
            options.persist,
            events_tx.clone(),
        );
        let handle = HostHandle {
            id: bridge.session().id.clone(),
            events: events_tx.clone(),
            status: status_rx,
        };

        let ctx = HostContext {
            bridge,
            channel: Channel::new(Side::Host, link.tx),
            events: events_tx,
            persister,
            deps,
            editor: options.editor,
            status: status_tx,
        };
        ctx.publish_status();

        (
            Self {
                ctx,
                table: host_table(),
                inbound: link.rx,
                events: events_rx,
            },
            handle,
        )
    }

    /// Serve until the view goes away or the session is closed, then flush
    pub async fn run(mut self) {
        let id = self.ctx.id().to_string();
        info!(session_id = %id, document = %self.ctx.document().display(), "session started");

        loop {
            tokio::select! {
                frame = self.inbound.recv() => {
                    let Some(frame) = frame else {
                        info!(session_id = %id, "view link closed");
                        break;
                    };
                    let outcome = self.table.dispatch(&mut self.ctx, &frame);
                    trace!(session_id = %id, ?outcome, "dispatched");
                }
                event = self.events.recv() => {
                    let closing = match event {
                        Some(event) => self.ctx.handle_event(event).is_break(),
                        None => true,
                    };
                    if closing {
                        info!(session_id = %id, "session closing");
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!(session_id = %id, "session ended");
    }

    async fn shutdown(self) {
        let Self { ctx, mut events, .. } = self;
        let HostContext {
            mut bridge,
            persister,
            status,
            channel,
            ..
        } = ctx;

        persister.close().await;
        while let Ok(event) = events.try_recv() {
            if let HostEvent::Persisted { revision } = event {
                bridge.mark_persisted(revision);
            }
        }

        let session = bridge.session();
        if session.dirty {
            warn!(session_id = %session.id, revision = session.revision, "closed with unsaved changes");
        }
        status.send_replace(SessionStatus {
            revision: session.revision,
            persisted_revision: session.persisted_revision,
            dirty: session.dirty,
            words: session.word_count(),
            view_ready: channel.peer_ready(),
            closed: true,
        });
    }
}

/// Build a session host and run it on its own task
pub fn spawn_session(
    link: Link,
    session: Session,
    deps: HostDeps,
    options: HostOptions,
) -> (HostHandle, JoinHandle<()>) {
    let (host, handle) = Host::new(link, session, deps, options);
    (handle, tokio::spawn(host.run()))
}
