//! View event loop
//!
//! One task owns the [`ViewContext`]. It multiplexes frames from the host with
//! local events (widget callbacks, window focus, scrolls, keys, timers) so no
//! two handlers ever run at the same time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use md_web_protocol::{
    Channel, CommandName, Dispatcher, EditPayload, EditorConfig, Envelope, FormatKind, IntervalGate, Link,
    Readiness, ReadySignal, ScrollPayload, Side, UploadRequest,
};

use crate::commands::view_table;
use crate::config::ViewConfig;
use crate::format;
use crate::input::{classify_key, is_mac, menu_effect, KeyAction, KeyChord, MenuAction, MenuEffect};
use crate::links::{link_for_click, rewrite_image_src, Click};
use crate::surface::{ContainerId, Frontend, TextSpan, WidgetFactory};
use crate::tracker::{RestoreStep, ScrollOutcome, ScrollReporter, ViewStateTracker};
use crate::upload::{encode_upload, Settled, UploadRelay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollSource {
    Container,
    Window,
}

/// Work scheduled for later, posted back into the loop by a timer task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deferred {
    RestoreSelection { generation: u64 },
    DiscoverContainer { attempt: u32 },
    VerifyWindowScroll { target: f64 },
}

#[derive(Debug)]
pub enum ViewEvent {
    /// Widget content changed by the user
    Input(String),
    Paste { mime: String, data: Vec<u8> },
    Blur,
    Focus,
    Scrolled { source: ScrollSource, raw_top: f64 },
    Key(KeyChord),
    Menu(MenuAction),
    Click(Click),
    /// A toolbar button by item name
    ToolbarClick(String),
    /// An `img` frame finished encoding
    Encoded { token: u64, frame: Result<Vec<u8>, String> },
    Timer(Deferred),
    Shutdown,
}

/// Cloneable handle the embedding uses to feed the view
#[derive(Debug, Clone)]
pub struct ViewHandle {
    events: mpsc::UnboundedSender<ViewEvent>,
    editor_ready: ReadySignal,
}

impl ViewHandle {
    fn send(&self, event: ViewEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn blur(&self) -> bool {
        self.send(ViewEvent::Blur)
    }

    pub fn focus(&self) -> bool {
        self.send(ViewEvent::Focus)
    }

    pub fn scrolled(&self, source: ScrollSource, raw_top: f64) -> bool {
        self.send(ViewEvent::Scrolled { source, raw_top })
    }

    pub fn key(&self, chord: KeyChord) -> bool {
        self.send(ViewEvent::Key(chord))
    }

    pub fn menu(&self, action: MenuAction) -> bool {
        self.send(ViewEvent::Menu(action))
    }

    pub fn click(&self, click: Click) -> bool {
        self.send(ViewEvent::Click(click))
    }

    pub fn toolbar_click(&self, name: &str) -> bool {
        self.send(ViewEvent::ToolbarClick(name.to_string()))
    }

    pub fn shutdown(&self) -> bool {
        self.send(ViewEvent::Shutdown)
    }

    /// Resolves once `open` has created the editor
    pub fn editor_ready(&self) -> ReadySignal {
        self.editor_ready.clone()
    }
}

pub struct ViewContext {
    pub(crate) config: ViewConfig,
    pub(crate) channel: Channel,
    pub(crate) events: mpsc::UnboundedSender<ViewEvent>,
    pub(crate) factory: Box<dyn WidgetFactory>,
    pub(crate) editor: Option<Box<dyn Frontend>>,
    pub(crate) editor_ready: Readiness,
    pub(crate) editor_config: EditorConfig,
    pub(crate) tracker: ViewStateTracker,
    pub(crate) reporter: ScrollReporter,
    pub(crate) uploads: UploadRelay,
    /// Revision of the content last received from the host
    pub(crate) revision: u64,
    pub(crate) container: Option<ContainerId>,
    /// Scroll target held back until a container mounts
    pub(crate) pending_scroll: Option<f64>,
    pub(crate) queued_formats: Vec<FormatKind>,
}

impl ViewContext {
    fn defer(&self, after: Duration, deferred: Deferred) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(ViewEvent::Timer(deferred));
        });
    }

    pub(crate) fn emit<P: serde::Serialize + ?Sized>(&mut self, name: CommandName, payload: &P) {
        if let Err(e) = self.channel.emit(name.clone(), payload) {
            warn!(command = %name, "emit failed: {}", e);
        }
    }

    fn emit_bare(&mut self, name: CommandName) {
        if let Err(e) = self.channel.emit_envelope(Envelope::bare(name.clone())) {
            warn!(command = %name, "emit failed: {}", e);
        }
    }

    /// Send the editor's current content, tagged with the last host revision
    pub(crate) fn save(&mut self, name: CommandName) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        let edit = EditPayload::tagged(editor.value(), self.revision);
        self.emit(name, &edit);
    }

    fn mac(&self) -> bool {
        is_mac(&self.editor_config.platform)
    }

    /// Replace the document while keeping selection and scroll
    pub(crate) fn replace_content(&mut self, content: &str) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let cursor = editor.cursor_position();
        self.tracker.capture(&**editor, cursor);
        editor.set_value(content);
        if let Some(generation) = self.tracker.reattach(&mut **editor) {
            self.defer(self.config.restore_delay, Deferred::RestoreSelection { generation });
        }
        self.rewrite_images();
    }

    /// Point local images at the resource origin
    pub(crate) fn rewrite_images(&mut self) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        for (image, src) in editor.rendered_images() {
            if let Some(rewritten) = rewrite_image_src(&src) {
                trace!(%src, %rewritten, "image source rewritten");
                editor.set_image_src(image, &rewritten);
            }
        }
    }

    pub(crate) fn discover(&mut self, attempt: u32) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        if let Some(container) = self.tracker.find_container(&**editor) {
            debug!(attempt, "scroll container attached");
            self.container = Some(container);
            if let Some(top) = self.pending_scroll.take() {
                self.restore_scroll(top);
            }
            return;
        }
        if attempt + 1 >= self.config.discovery_attempts {
            warn!(attempts = attempt + 1, "no scroll container found");
            return;
        }
        trace!(attempt, "scroll container not mounted yet");
        self.defer(
            self.config.discovery_interval,
            Deferred::DiscoverContainer { attempt: attempt + 1 },
        );
    }

    pub(crate) fn restore_scroll(&mut self, top: f64) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let outcome = self.tracker.scroll_editor(&mut **editor, top, self.config.correction());
        // Window only for now; the container gets it once it mounts
        self.pending_scroll = match outcome {
            ScrollOutcome::Applied { container: None, .. } => Some(top),
            _ => None,
        };
        if let ScrollOutcome::Applied { target, .. } = outcome {
            self.defer(self.config.window_verify_delay, Deferred::VerifyWindowScroll { target });
        }
    }

    pub(crate) fn format(&mut self, kind: FormatKind) {
        let Some(editor) = self.editor.as_mut() else {
            debug!(?kind, "editor not ready, queueing format");
            self.queued_formats.push(kind);
            return;
        };
        format::apply(&mut **editor, kind);
        self.save(CommandName::Save);
    }

    /// Substitute (or drop) an upload placeholder
    pub(crate) fn settle_upload(&mut self, token: u64, uri: Option<&str>) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        let content = editor.value();
        let settled = match uri {
            Some(uri) => self.uploads.resolve(&content, token, uri),
            None => self.uploads.fail(&content, token),
        };
        match settled {
            Settled::Replaced(next) => {
                self.replace_content(&next);
                self.save(CommandName::Save);
            }
            Settled::PlaceholderGone => debug!(token, "placeholder removed before upload settled"),
            Settled::UnknownToken => warn!(token, "upload result for unknown token"),
        }
    }

    fn handle_event(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Input(content) => {
                if self.editor.is_some() {
                    self.rewrite_images();
                    let edit = EditPayload::tagged(content, self.revision);
                    self.emit(CommandName::Save, &edit);
                }
            }
            ViewEvent::Paste { mime, data } => self.paste(mime, data),
            ViewEvent::Encoded { token, frame } => match frame {
                Ok(frame) => {
                    if let Err(e) = self.channel.send_frame(CommandName::Img, frame) {
                        warn!(token, "upload send failed: {}", e);
                        self.settle_upload(token, None);
                    }
                }
                Err(e) => {
                    warn!(token, "upload encode failed: {}", e);
                    self.settle_upload(token, None);
                }
            },
            ViewEvent::Blur => {
                if let Some(editor) = self.editor.as_ref() {
                    let cursor = editor.cursor_position();
                    self.tracker.capture(&**editor, cursor);
                }
            }
            ViewEvent::Focus => {
                let Some(editor) = self.editor.as_mut() else {
                    return;
                };
                if let Some(generation) = self.tracker.resume(&mut **editor) {
                    self.defer(self.config.restore_delay, Deferred::RestoreSelection { generation });
                }
            }
            ViewEvent::Scrolled { source, raw_top } => {
                if self.editor.is_none() || (source == ScrollSource::Container && self.container.is_none()) {
                    return;
                }
                if let Some(scroll_top) = self.reporter.report(raw_top, Instant::now()) {
                    self.emit(CommandName::Scroll, &ScrollPayload { scroll_top });
                }
            }
            ViewEvent::Key(chord) => self.key(&chord),
            ViewEvent::Menu(action) => self.menu(action),
            ViewEvent::Click(click) => {
                if let Some(url) = link_for_click(&click, self.mac()) {
                    self.emit(CommandName::OpenLink, url.as_str());
                }
            }
            ViewEvent::ToolbarClick(name) => self.toolbar_click(&name),
            ViewEvent::Timer(deferred) => self.timer(deferred),
            ViewEvent::Shutdown => {}
        }
    }

    fn paste(&mut self, mime: String, data: Vec<u8>) {
        let Some(editor) = self.editor.as_mut() else {
            warn!("paste before editor is ready");
            return;
        };
        let token = self.uploads.begin();
        editor.insert_value(&self.uploads.placeholder(token));
        debug!(token, %mime, bytes = data.len(), "upload started");

        let events = self.events.clone();
        tokio::spawn(async move {
            let frame = encode_upload(UploadRequest { token, mime, data })
                .await
                .map_err(|e| e.to_string());
            let _ = events.send(ViewEvent::Encoded { token, frame });
        });
    }

    fn key(&mut self, chord: &KeyChord) {
        match classify_key(chord, self.mac(), self.editor_config.prevent_mac_option_key) {
            KeyAction::EditInHost => self.emit(CommandName::EditInVSCode, &true),
            KeyAction::DeveloperTool => self.emit_bare(CommandName::DeveloperTool),
            KeyAction::Save => self.save(CommandName::DoSave),
            KeyAction::PastePlainText => self.paste_plain_text(),
            KeyAction::PasteOverSelection => {
                let Some(editor) = self.editor.as_mut() else {
                    return;
                };
                if !editor.selected_text().is_empty() {
                    editor.update_value("");
                    self.save(CommandName::Save);
                }
            }
            KeyAction::AutoPair { close } => self.auto_pair(close),
            KeyAction::Suppress | KeyAction::PassThrough => {}
        }
    }

    fn paste_plain_text(&mut self) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let Some(text) = editor.clipboard_text() else {
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        editor.insert_value(text);
        self.rewrite_images();
        self.save(CommandName::Save);
    }

    /// Put `close` after the caret and step back over it
    fn auto_pair(&mut self, close: char) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        if !editor.selected_text().is_empty() {
            return;
        }
        editor.insert_value(close.encode_utf8(&mut [0; 4]));
        let inside = editor
            .cursor_position()
            .and_then(|at| editor.range_at(TextSpan::caret(at.saturating_sub(1))));
        if let Some(range) = inside {
            editor.apply_selection(&range);
        }
    }

    fn toolbar_click(&mut self, name: &str) {
        if name != "outline" {
            trace!(name, "toolbar handled in view");
            return;
        }
        self.editor_config.outline = !self.editor_config.outline;
        let enabled = self.editor_config.outline;
        debug!(enabled, "outline toggled");
        self.emit(CommandName::SaveOutline, &enabled);
    }

    fn menu(&mut self, action: MenuAction) {
        let has_selection = self
            .editor
            .as_ref()
            .is_some_and(|editor| !editor.selected_text().is_empty());

        match menu_effect(action, has_selection) {
            MenuEffect::Local => trace!(?action, "handled in view"),
            MenuEffect::Command { id, delete_selection } => {
                if delete_selection {
                    if let Some(editor) = self.editor.as_mut() {
                        editor.update_value("");
                    }
                    self.save(CommandName::Save);
                }
                self.emit(CommandName::Command, id);
            }
            MenuEffect::Export(request) => self.emit(CommandName::Export, &request),
        }
    }

    fn timer(&mut self, deferred: Deferred) {
        match deferred {
            Deferred::RestoreSelection { generation } => {
                let Some(editor) = self.editor.as_mut() else {
                    return;
                };
                match self.tracker.restore_pending(&mut **editor, generation) {
                    RestoreStep::Retry { generation } => {
                        self.defer(
                            self.config.restore_retry_interval,
                            Deferred::RestoreSelection { generation },
                        );
                    }
                    RestoreStep::Restored(tier) => trace!(generation, ?tier, "restore finished"),
                    RestoreStep::Superseded => trace!(generation, "restore superseded"),
                }
            }
            Deferred::DiscoverContainer { attempt } => self.discover(attempt),
            Deferred::VerifyWindowScroll { target } => {
                if let Some(editor) = self.editor.as_mut() {
                    ViewStateTracker::verify_window(&mut **editor, target, self.config.window_tolerance);
                }
            }
        }
    }
}

pub struct View {
    ctx: ViewContext,
    table: Dispatcher<ViewContext>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedReceiver<ViewEvent>,
}

impl View {
    pub fn new(link: Link, factory: Box<dyn WidgetFactory>, config: ViewConfig) -> (Self, ViewHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let editor_ready = Readiness::new();
        let handle = ViewHandle {
            events: events_tx.clone(),
            editor_ready: editor_ready.signal(),
        };

        let reporter = ScrollReporter::new(
            Box::new(IntervalGate::new(config.scroll_throttle)),
            config.correction(),
        );
        let tracker = ViewStateTracker::new(config.container_selectors.clone(), config.restore_attempts);

        let ctx = ViewContext {
            config,
            channel: Channel::new(Side::View, link.tx),
            events: events_tx,
            factory,
            editor: None,
            editor_ready,
            editor_config: EditorConfig::default(),
            tracker,
            reporter,
            uploads: UploadRelay::new(),
            revision: 0,
            container: None,
            pending_scroll: None,
            queued_formats: Vec::new(),
        };

        (
            Self {
                ctx,
                table: view_table(),
                inbound: link.rx,
                events: events_rx,
            },
            handle,
        )
    }

    /// Send `init`, then serve until the host goes away or shutdown
    pub async fn run(mut self) {
        self.ctx.emit_bare(CommandName::Init);
        info!("view started");

        loop {
            tokio::select! {
                frame = self.inbound.recv() => {
                    let Some(frame) = frame else {
                        info!("host link closed");
                        break;
                    };
                    let outcome = self.table.dispatch(&mut self.ctx, &frame);
                    trace!(?outcome, "dispatched");
                }
                event = self.events.recv() => match event {
                    Some(ViewEvent::Shutdown) | None => {
                        info!("view shutting down");
                        break;
                    }
                    Some(event) => self.ctx.handle_event(event),
                },
            }
        }
    }
}

/// Build a view and run it on its own task
pub fn spawn_view(link: Link, factory: Box<dyn WidgetFactory>, config: ViewConfig) -> (ViewHandle, JoinHandle<()>) {
    let (view, handle) = View::new(link, factory, config);
    (handle, tokio::spawn(view.run()))
}
