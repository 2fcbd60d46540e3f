//! In-memory editor surface
//!
//! Models the document as one node per line. Every content mutation rebuilds
//! the nodes with fresh ids, the way a re-rendering widget detaches the nodes
//! a live selection pointed into. Used by tests and by embedders that have
//! no DOM.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::surface::{
    Caret, ContainerId, EditorWidget, Frontend, NodeId, SelectionRange, Surface, TextSpan, WidgetCallbacks,
    WidgetConfig, WidgetFactory,
};

/// Containers an instant-rendering editor mounts
const IR_CONTAINERS: [&str; 3] = [".vditor-reset", ".vditor-ir", ".vditor"];

#[derive(Debug)]
struct Line {
    id: NodeId,
    text: String,
}

#[derive(Debug, Default)]
struct HeadlessState {
    lines: Vec<Line>,
    images: Vec<(NodeId, String)>,
    next_id: u64,
    chrome: Option<NodeId>,
    selection: Option<SelectionRange>,
    focused: bool,
    mounted: Vec<(String, f64)>,
    window_scroll: f64,
    clipboard: Option<String>,
    reject_applies: u32,
    ignore_window_scrolls: u32,
    defer_containers: bool,
    config: Option<WidgetConfig>,
    callbacks: Option<WidgetCallbacks>,
    created: u32,
}

fn lock(state: &Mutex<HeadlessState>) -> MutexGuard<'_, HeadlessState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn byte_at(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}

/// Sources of `![alt](src)` references, in document order
fn image_sources(content: &str) -> Vec<String> {
    let mut sources = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("![") {
        rest = &rest[start + 2..];
        let Some(mid) = rest.find("](") else { break };
        let after = &rest[mid + 2..];
        let Some(end) = after.find(')') else { break };
        if end > 0 {
            sources.push(after[..end].to_string());
        }
        rest = &after[end + 1..];
    }
    sources
}

fn splice(s: &str, start: usize, end: usize, text: &str) -> String {
    let (a, b) = (byte_at(s, start), byte_at(s, end));
    let mut out = String::with_capacity(s.len() + text.len());
    out.push_str(&s[..a]);
    out.push_str(text);
    out.push_str(&s[b..]);
    out
}

impl HeadlessState {
    fn fresh_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn load(&mut self, content: &str) {
        let lines = content
            .split('\n')
            .map(|text| Line {
                id: self.fresh_id(),
                text: text.to_string(),
            })
            .collect();
        self.lines = lines;
        let images = image_sources(content)
            .into_iter()
            .map(|src| (self.fresh_id(), src))
            .collect();
        self.images = images;
        self.selection = None;
    }

    fn value(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n")
    }

    fn len(&self) -> usize {
        self.lines.iter().map(|l| l.text.chars().count() + 1).sum::<usize>().saturating_sub(1)
    }

    fn caret_offset(&self, caret: Caret) -> Option<usize> {
        let mut base = 0;
        for line in &self.lines {
            let len = line.text.chars().count();
            if line.id == caret.node {
                return (caret.offset <= len).then_some(base + caret.offset);
            }
            base += len + 1;
        }
        None
    }

    fn caret_at(&self, mut pos: usize) -> Option<Caret> {
        for line in &self.lines {
            let len = line.text.chars().count();
            if pos <= len {
                return Some(Caret {
                    node: line.id,
                    offset: pos,
                });
            }
            pos -= len + 1;
        }
        None
    }

    fn valid(&self, caret: Caret) -> bool {
        (self.chrome == Some(caret.node) && caret.offset == 0) || self.caret_offset(caret).is_some()
    }

    fn span_of(&self, range: &SelectionRange) -> Option<TextSpan> {
        Some(TextSpan::new(
            self.caret_offset(range.anchor)?,
            self.caret_offset(range.focus)?,
        ))
    }

    fn range_at(&self, span: TextSpan) -> Option<SelectionRange> {
        Some(SelectionRange {
            anchor: self.caret_at(span.anchor)?,
            focus: self.caret_at(span.focus)?,
        })
    }

    /// Current selection inside the editor, or a caret at the end
    fn edit_span(&self) -> TextSpan {
        self.selection
            .and_then(|r| self.span_of(&r))
            .unwrap_or_else(|| TextSpan::caret(self.len()))
    }

    fn replace(&mut self, span: TextSpan, text: &str) {
        let value = splice(&self.value(), span.start(), span.end(), text);
        self.load(&value);
        let caret = span.start() + text.chars().count();
        self.selection = self.caret_at(caret).map(SelectionRange::collapsed);
    }

    fn selected_text(&self) -> String {
        self.selection
            .and_then(|r| self.span_of(&r))
            .map(|span| {
                self.value()
                    .chars()
                    .skip(span.start())
                    .take(span.end() - span.start())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Editor instance handed to the view runtime
#[derive(Debug)]
pub struct HeadlessEditor {
    state: Arc<Mutex<HeadlessState>>,
}

impl Surface for HeadlessEditor {
    fn selection(&self) -> Option<SelectionRange> {
        lock(&self.state).selection
    }

    fn apply_selection(&mut self, range: &SelectionRange) -> bool {
        let mut state = lock(&self.state);
        if state.reject_applies > 0 {
            state.reject_applies -= 1;
            return false;
        }
        if !state.valid(range.anchor) || !state.valid(range.focus) {
            return false;
        }
        state.selection = Some(*range);
        true
    }

    fn editor_contains(&self, node: NodeId) -> bool {
        lock(&self.state).lines.iter().any(|l| l.id == node)
    }

    fn span_of(&self, range: &SelectionRange) -> Option<TextSpan> {
        lock(&self.state).span_of(range)
    }

    fn range_at(&self, span: TextSpan) -> Option<SelectionRange> {
        lock(&self.state).range_at(span)
    }

    fn focus_editor(&mut self) {
        lock(&self.state).focused = true;
    }

    fn editor_focused(&self) -> bool {
        lock(&self.state).focused
    }

    fn find_container(&self, selector: &str) -> Option<ContainerId> {
        let state = lock(&self.state);
        let index = state.mounted.iter().position(|(s, _)| s == selector)?;
        u32::try_from(index).ok().map(ContainerId)
    }

    fn container_scroll_top(&self, container: ContainerId) -> f64 {
        lock(&self.state)
            .mounted
            .get(container.0 as usize)
            .map_or(0.0, |(_, top)| *top)
    }

    fn scroll_container_to(&mut self, container: ContainerId, top: f64) {
        if let Some((_, current)) = lock(&self.state).mounted.get_mut(container.0 as usize) {
            *current = top.max(0.0);
        }
    }

    fn window_scroll_top(&self) -> f64 {
        lock(&self.state).window_scroll
    }

    fn scroll_window_to(&mut self, top: f64) {
        let mut state = lock(&self.state);
        if state.ignore_window_scrolls > 0 {
            state.ignore_window_scrolls -= 1;
            return;
        }
        state.window_scroll = top.max(0.0);
    }

    fn force_window_scroll(&mut self, top: f64) {
        lock(&self.state).window_scroll = top.max(0.0);
    }

    fn rendered_images(&self) -> Vec<(NodeId, String)> {
        lock(&self.state).images.clone()
    }

    fn set_image_src(&mut self, image: NodeId, src: &str) {
        if let Some((_, current)) = lock(&self.state).images.iter_mut().find(|(id, _)| *id == image) {
            *current = src.to_string();
        }
    }

    fn clipboard_text(&self) -> Option<String> {
        lock(&self.state).clipboard.clone()
    }
}

impl EditorWidget for HeadlessEditor {
    fn value(&self) -> String {
        lock(&self.state).value()
    }

    fn set_value(&mut self, content: &str) {
        lock(&self.state).load(content);
    }

    fn insert_value(&mut self, text: &str) {
        let mut state = lock(&self.state);
        let span = state.edit_span();
        state.replace(span, text);
    }

    fn update_value(&mut self, text: &str) {
        self.insert_value(text);
    }

    fn selected_text(&self) -> String {
        lock(&self.state).selected_text()
    }

    fn cursor_position(&self) -> Option<usize> {
        let state = lock(&self.state);
        state.selection.and_then(|r| state.caret_offset(r.focus))
    }

    fn focus(&mut self) {
        lock(&self.state).focused = true;
    }
}

/// Builds [`HeadlessEditor`]s that share state with a [`HeadlessDriver`]
#[derive(Debug)]
pub struct HeadlessFactory {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessFactory {
    pub fn new() -> (Self, HeadlessDriver) {
        let state = Arc::new(Mutex::new(HeadlessState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            HeadlessDriver { state },
        )
    }

    /// Start without scroll containers; mount them later through the driver
    #[must_use]
    pub fn with_deferred_containers(self) -> Self {
        lock(&self.state).defer_containers = true;
        self
    }
}

impl WidgetFactory for HeadlessFactory {
    fn create(&mut self, config: WidgetConfig, callbacks: WidgetCallbacks) -> Box<dyn Frontend> {
        let mut state = lock(&self.state);
        state.load(&config.value);
        let chrome = state.fresh_id();
        state.chrome = Some(chrome);
        state.focused = false;
        state.mounted = if state.defer_containers {
            Vec::new()
        } else {
            IR_CONTAINERS.iter().map(|s| ((*s).to_string(), 0.0)).collect()
        };
        state.config = Some(config);
        state.callbacks = Some(callbacks);
        state.created += 1;
        drop(state);

        Box::new(HeadlessEditor {
            state: Arc::clone(&self.state),
        })
    }
}

/// Test-side handle: inspects the editor and simulates user actions
#[derive(Debug, Clone)]
pub struct HeadlessDriver {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessDriver {
    pub fn content(&self) -> String {
        lock(&self.state).value()
    }

    pub fn selection_span(&self) -> Option<TextSpan> {
        let state = lock(&self.state);
        state.selection.and_then(|r| state.span_of(&r))
    }

    pub fn selected_text(&self) -> String {
        lock(&self.state).selected_text()
    }

    /// Place the selection, as a user drag would
    pub fn select(&self, span: TextSpan) -> bool {
        let mut state = lock(&self.state);
        let range = state.range_at(span);
        state.selection = range;
        range.is_some()
    }

    /// Put the selection on toolbar chrome, outside the editor
    pub fn select_in_chrome(&self) {
        let mut state = lock(&self.state);
        state.selection = state.chrome.map(|node| SelectionRange::collapsed(Caret { node, offset: 0 }));
    }

    /// Type at the selection and fire the widget's input callback
    pub fn type_text(&self, text: &str) {
        let (value, callbacks) = {
            let mut state = lock(&self.state);
            let span = state.edit_span();
            state.replace(span, text);
            (state.value(), state.callbacks.clone())
        };
        if let Some(callbacks) = callbacks {
            callbacks.input(value);
        }
    }

    /// Paste a file through the widget's upload callback
    pub fn paste(&self, mime: &str, data: Vec<u8>) {
        let callbacks = lock(&self.state).callbacks.clone();
        if let Some(callbacks) = callbacks {
            callbacks.upload(mime.to_string(), data);
        }
    }

    /// What the rendered images currently load
    pub fn image_sources(&self) -> Vec<String> {
        lock(&self.state).images.iter().map(|(_, src)| src.clone()).collect()
    }

    pub fn set_clipboard(&self, text: &str) {
        lock(&self.state).clipboard = Some(text.to_string());
    }

    pub fn mount_container(&self, selector: &str) {
        lock(&self.state).mounted.push((selector.to_string(), 0.0));
    }

    pub fn container_scroll(&self, selector: &str) -> Option<f64> {
        lock(&self.state)
            .mounted
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, top)| *top)
    }

    pub fn window_scroll(&self) -> f64 {
        lock(&self.state).window_scroll
    }

    pub fn reject_next_selection_applies(&self, n: u32) {
        lock(&self.state).reject_applies = n;
    }

    /// Drop the next `n` smooth window scrolls, as a page mid-layout does
    pub fn ignore_next_window_scrolls(&self, n: u32) {
        lock(&self.state).ignore_window_scrolls = n;
    }

    pub fn blur(&self) {
        lock(&self.state).focused = false;
    }

    pub fn focused(&self) -> bool {
        lock(&self.state).focused
    }

    pub fn widget_config(&self) -> Option<WidgetConfig> {
        lock(&self.state).config.clone()
    }

    pub fn created_count(&self) -> u32 {
        lock(&self.state).created
    }
}
