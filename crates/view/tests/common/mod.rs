//! Common test utilities
#![allow(dead_code)] // Not every test file uses every helper

use std::time::Duration;

use md_web_protocol::{link_pair, CommandName, EditorConfig, Envelope, Link, OpenPayload};
use md_web_view::{spawn_view, HeadlessFactory, HeadlessDriver, ViewConfig, ViewHandle};
use serde::Serialize;
use tokio::task::JoinHandle;

/// Plays the host end of a link against a real view
pub struct FakeHost {
    pub link: Link,
    pub view: ViewHandle,
    pub driver: HeadlessDriver,
    pub task: JoinHandle<()>,
}

impl FakeHost {
    pub fn start() -> Self {
        let (factory, driver) = HeadlessFactory::new();
        Self::start_with(factory, driver)
    }

    pub fn start_with(factory: HeadlessFactory, driver: HeadlessDriver) -> Self {
        let (host, view_link) = link_pair();
        let (view, task) = spawn_view(view_link, Box::new(factory), ViewConfig::default());
        Self {
            link: host,
            view,
            driver,
            task,
        }
    }

    pub fn send<P: Serialize + ?Sized>(&self, name: CommandName, payload: &P) {
        let frame = Envelope::new(name, payload).unwrap().encode().unwrap();
        self.link.tx.send(frame).unwrap();
    }

    /// Next envelope from the view, or `None` after a quiet period
    pub async fn recv(&mut self) -> Option<Envelope> {
        let frame = tokio::time::timeout(Duration::from_secs(1), self.link.rx.recv())
            .await
            .ok()??;
        Some(Envelope::decode(&frame).unwrap())
    }

    /// Drain everything the view has sent so far
    pub async fn drain(&mut self) -> Vec<Envelope> {
        settle().await;
        let mut out = Vec::new();
        while let Ok(frame) = self.link.rx.try_recv() {
            out.push(Envelope::decode(&frame).unwrap());
        }
        out
    }

    /// Complete the handshake with `content` at `revision`
    pub async fn open(&mut self, content: &str, revision: u64) {
        self.open_at(content, revision, 0.0).await;
    }

    /// Complete the handshake, asking the view to restore `scroll_top`
    pub async fn open_at(&mut self, content: &str, revision: u64, scroll_top: f64) {
        let init = self.recv().await.expect("view should send init");
        assert_eq!(init.name, CommandName::Init);
        self.send(
            CommandName::Open,
            &OpenPayload {
                content: content.to_string(),
                root_path: "/workspace".to_string(),
                config: EditorConfig {
                    platform: "linux".to_string(),
                    ..EditorConfig::default()
                },
                scroll_top,
                revision,
            },
        );
        assert!(self.view.editor_ready().wait().await);
        settle().await;
    }
}

/// Let the view drain its queues and fire short timers
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}
