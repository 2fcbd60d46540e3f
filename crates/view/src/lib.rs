//! md-web view runtime
//!
//! Runs inside the sandboxed editor context. Owns the editor widget, keeps the
//! user's cursor, selection, scroll and focus stable across blur/focus cycles
//! and host-driven content replacement, and speaks the md-web protocol to the
//! host over a [`md_web_protocol::Link`].

pub mod commands;
pub mod config;
pub mod format;
pub mod headless;
pub mod input;
pub mod links;
pub mod runtime;
pub mod surface;
pub mod toolbar;
pub mod tracker;
pub mod upload;

pub use config::{RenderMode, ScrollCorrection, ViewConfig};
pub use headless::{HeadlessFactory, HeadlessDriver};
pub use input::{KeyChord, MenuAction};
pub use links::{Click, ClickKind, ClickTarget};
pub use runtime::{spawn_view, ScrollSource, View, ViewEvent, ViewHandle};
pub use surface::{EditorWidget, Frontend, Surface, TextSpan, WidgetConfig, WidgetFactory};
pub use toolbar::{ToolItem, ToolbarSpec};
pub use tracker::{RestoreTier, ViewState, ViewStateTracker};
