//! Common test utilities
#![allow(dead_code)] // Not every test file uses every helper

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use md_web_host::{
    load_session, spawn_session, AttachmentStore, DocumentStore, HostDeps, HostHandle, HostOptions, HostServices,
    StoreError,
};
use md_web_protocol::{link_pair, CommandName, EditorConfig, Envelope, ExportFormat, Link};
use md_web_view::{spawn_view, HeadlessFactory, HeadlessDriver, ViewConfig, ViewHandle};
use serde::Serialize;
use tokio::task::JoinHandle;

pub const DOC: &str = "/notes/today.md";

/// Documents kept in memory; every write is recorded
#[derive(Default)]
pub struct MemoryDocuments {
    files: Mutex<HashMap<PathBuf, String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryDocuments {
    pub fn with(path: &str, content: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), content.to_string());
        Arc::new(store)
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn current(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(Path::new(path)).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn load(&self, path: &Path) -> Result<String, StoreError> {
        Ok(self.files.lock().unwrap().get(path).cloned().unwrap_or_default())
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        self.writes.lock().unwrap().push(content.to_string());
        Ok(())
    }
}

/// Hands out `assets/img-N.png`, or refuses when told to
#[derive(Default)]
pub struct MemoryAttachments {
    stored: AtomicU32,
    pub refuse: AtomicBool,
}

#[async_trait]
impl AttachmentStore for MemoryAttachments {
    async fn store(&self, _document: &Path, mime: &str, data: Vec<u8>) -> Result<String, StoreError> {
        if self.refuse.load(Ordering::SeqCst) || data.is_empty() {
            return Err(StoreError::UnsupportedMime(mime.to_string()));
        }
        let n = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("assets/img-{n}.png"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    OpenLink(String),
    Command(String),
    Export { format: ExportFormat, without_outline: bool },
    SaveOutline(bool),
    EditAsText(PathBuf),
    DeveloperTools,
}

#[derive(Default)]
pub struct RecordingServices {
    calls: Mutex<Vec<ServiceCall>>,
}

impl RecordingServices {
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ServiceCall) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl HostServices for RecordingServices {
    async fn open_link(&self, url: &str) -> anyhow::Result<()> {
        self.record(ServiceCall::OpenLink(url.to_string()))
    }

    async fn run_command(&self, id: &str) -> anyhow::Result<()> {
        self.record(ServiceCall::Command(id.to_string()))
    }

    async fn export(&self, _document: &Path, format: ExportFormat, without_outline: bool) -> anyhow::Result<()> {
        self.record(ServiceCall::Export { format, without_outline })
    }

    async fn edit_in_text_editor(&self, document: &Path) -> anyhow::Result<()> {
        self.record(ServiceCall::EditAsText(document.to_path_buf()))
    }

    async fn open_developer_tools(&self) -> anyhow::Result<()> {
        self.record(ServiceCall::DeveloperTools)
    }

    async fn save_outline(&self, enabled: bool) -> anyhow::Result<()> {
        self.record(ServiceCall::SaveOutline(enabled))
    }
}

pub struct Stores {
    pub documents: Arc<MemoryDocuments>,
    pub attachments: Arc<MemoryAttachments>,
    pub services: Arc<RecordingServices>,
}

impl Stores {
    pub fn new(content: &str) -> Self {
        Self {
            documents: MemoryDocuments::with(DOC, content),
            attachments: Arc::new(MemoryAttachments::default()),
            services: Arc::new(RecordingServices::default()),
        }
    }

    pub fn deps(&self) -> HostDeps {
        HostDeps {
            documents: self.documents.clone(),
            attachments: self.attachments.clone(),
            services: self.services.clone(),
        }
    }
}

pub fn options() -> HostOptions {
    HostOptions {
        editor: EditorConfig {
            platform: "linux".to_string(),
            ..EditorConfig::default()
        },
        ..HostOptions::default()
    }
}

/// Start a host session for `DOC`; returns the view end of its link
pub async fn start_host(stores: &Stores) -> (HostHandle, JoinHandle<()>, Link) {
    let session = load_session(&*stores.documents, PathBuf::from(DOC)).await.unwrap();
    let (host_link, view_link) = link_pair();
    let (handle, task) = spawn_session(host_link, session, stores.deps(), options());
    (handle, task, view_link)
}

/// A real host session wired to a real view with a headless editor
pub struct Pair {
    pub stores: Stores,
    pub host: HostHandle,
    pub host_task: JoinHandle<()>,
    pub view: ViewHandle,
    pub view_task: JoinHandle<()>,
    pub driver: HeadlessDriver,
}

impl Pair {
    pub async fn start(content: &str) -> Self {
        let stores = Stores::new(content);
        let (host, host_task, view_link) = start_host(&stores).await;
        Self::attach(stores, host, host_task, view_link).await
    }

    pub async fn attach(stores: Stores, host: HostHandle, host_task: JoinHandle<()>, view_link: Link) -> Self {
        let (factory, driver) = HeadlessFactory::new();
        let (view, view_task) = spawn_view(view_link, Box::new(factory), ViewConfig::default());
        assert!(view.editor_ready().wait().await, "view never opened");
        settle().await;
        Self {
            stores,
            host,
            host_task,
            view,
            view_task,
            driver,
        }
    }
}

/// Plays the view end of a link by hand
pub struct RawView {
    pub link: Link,
}

impl RawView {
    pub fn send<P: Serialize + ?Sized>(&self, name: CommandName, payload: &P) {
        let frame = Envelope::new(name, payload).unwrap().encode().unwrap();
        self.link.tx.send(frame).unwrap();
    }

    pub fn send_frame(&self, frame: Vec<u8>) {
        self.link.tx.send(frame).unwrap();
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        let frame = tokio::time::timeout(Duration::from_secs(1), self.link.rx.recv())
            .await
            .ok()??;
        Some(Envelope::decode(&frame).unwrap())
    }

    pub async fn drain(&mut self) -> Vec<Envelope> {
        settle().await;
        let mut out = Vec::new();
        while let Ok(frame) = self.link.rx.try_recv() {
            out.push(Envelope::decode(&frame).unwrap());
        }
        out
    }

    /// Send `init` and return the `open` it is answered with
    pub async fn init(&mut self) -> Envelope {
        self.link
            .tx
            .send(Envelope::bare(CommandName::Init).encode().unwrap())
            .unwrap();
        let open = self.recv().await.expect("host should answer init");
        assert_eq!(open.name, CommandName::Open);
        open
    }
}

/// Longer than the default persist debounce
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}
