//! Seams to the rendering environment
//!
//! [`EditorWidget`] is the rich-text widget's API. [`Surface`] is the slice of
//! the document model the tracker needs: selection, subtree membership,
//! scroll containers and focus. A real embedding implements both over the
//! DOM; [`crate::headless`] implements them in memory.

use tokio::sync::mpsc;

use crate::config::RenderMode;
use crate::runtime::ViewEvent;
use crate::toolbar::ToolbarSpec;

/// Opaque handle to a rendered node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
    pub node: NodeId,
    /// Character offset inside the node
    pub offset: usize,
}

/// A live selection expressed in node coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub anchor: Caret,
    pub focus: Caret,
}

impl SelectionRange {
    pub const fn collapsed(at: Caret) -> Self {
        Self {
            anchor: at,
            focus: at,
        }
    }
}

/// A selection expressed in character offsets into the document text
///
/// Survives node teardown as long as the text does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub anchor: usize,
    pub focus: usize,
}

impl TextSpan {
    pub const fn new(anchor: usize, focus: usize) -> Self {
        Self { anchor, focus }
    }

    pub const fn caret(at: usize) -> Self {
        Self::new(at, at)
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.focus)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.focus)
    }

    pub const fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u32);

pub trait Surface {
    fn selection(&self) -> Option<SelectionRange>;

    /// Re-apply a range; `false` if its nodes are gone or the surface refused
    fn apply_selection(&mut self, range: &SelectionRange) -> bool;

    /// Whether `node` is part of the editor's live subtree
    fn editor_contains(&self, node: NodeId) -> bool;

    fn span_of(&self, range: &SelectionRange) -> Option<TextSpan>;

    fn range_at(&self, span: TextSpan) -> Option<SelectionRange>;

    fn focus_editor(&mut self);

    fn editor_focused(&self) -> bool;

    fn find_container(&self, selector: &str) -> Option<ContainerId>;

    fn container_scroll_top(&self, container: ContainerId) -> f64;

    fn scroll_container_to(&mut self, container: ContainerId, top: f64);

    fn window_scroll_top(&self) -> f64;

    fn scroll_window_to(&mut self, top: f64);

    /// Assign the document scroll offset directly, bypassing scroll behaviour
    fn force_window_scroll(&mut self, top: f64) {
        self.scroll_window_to(top);
    }

    /// Rendered images and the source each one currently loads
    fn rendered_images(&self) -> Vec<(NodeId, String)>;

    /// Point a rendered image elsewhere; the markdown is left as written
    fn set_image_src(&mut self, image: NodeId, src: &str);

    /// Plain text on the system clipboard
    fn clipboard_text(&self) -> Option<String>;
}

pub trait EditorWidget {
    fn value(&self) -> String;

    /// Replace the whole document
    fn set_value(&mut self, content: &str);

    /// Insert at the caret, replacing any selection
    fn insert_value(&mut self, text: &str);

    /// Replace the current selection
    fn update_value(&mut self, text: &str);

    fn selected_text(&self) -> String;

    fn cursor_position(&self) -> Option<usize>;

    fn focus(&mut self);
}

/// Everything the view runtime drives
pub trait Frontend: EditorWidget + Surface + Send {}

impl<T: EditorWidget + Surface + Send> Frontend for T {}

/// Construction options for the widget
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    pub mode: RenderMode,
    pub language: String,
    /// `None` when the toolbar is hidden
    pub toolbar: Option<ToolbarSpec>,
    pub tab: String,
    pub math_engine: String,
    pub code_line_numbers: bool,
    pub outline: bool,
    pub resource_path: String,
    pub value: String,
}

/// Widget callbacks, routed into the view's event queue
#[derive(Debug, Clone)]
pub struct WidgetCallbacks {
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl WidgetCallbacks {
    pub(crate) const fn new(events: mpsc::UnboundedSender<ViewEvent>) -> Self {
        Self { events }
    }

    /// The user changed the document
    pub fn input(&self, content: String) {
        let _ = self.events.send(ViewEvent::Input(content));
    }

    /// The user pasted or dropped a file; ownership of the bytes moves here
    pub fn upload(&self, mime: String, data: Vec<u8>) {
        let _ = self.events.send(ViewEvent::Paste { mime, data });
    }
}

pub trait WidgetFactory: Send {
    fn create(&mut self, config: WidgetConfig, callbacks: WidgetCallbacks) -> Box<dyn Frontend>;
}
