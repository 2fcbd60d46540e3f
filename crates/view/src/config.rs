//! View tunables
//!
//! Everything here has a working default; embedders override individual
//! fields.

use std::time::Duration;

/// Editor rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Instant rendering (default)
    #[default]
    Ir,
    Wysiwyg,
    SplitView,
}

impl RenderMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ir => "ir",
            Self::Wysiwyg => "wysiwyg",
            Self::SplitView => "sv",
        }
    }
}

/// Pixels of fixed chrome above the scroll container, per mode
///
/// Subtracted from reported offsets and added back on restore, so a value
/// that round-trips through the host lands where it started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollCorrection {
    pub ir: f64,
    pub wysiwyg: f64,
    pub split_view: f64,
}

impl ScrollCorrection {
    pub const fn uniform(px: f64) -> Self {
        Self {
            ir: px,
            wysiwyg: px,
            split_view: px,
        }
    }

    pub const fn for_mode(&self, mode: RenderMode) -> f64 {
        match mode {
            RenderMode::Ir => self.ir,
            RenderMode::Wysiwyg => self.wysiwyg,
            RenderMode::SplitView => self.split_view,
        }
    }
}

impl Default for ScrollCorrection {
    fn default() -> Self {
        Self::uniform(70.0)
    }
}

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub mode: RenderMode,
    /// Minimum spacing between `scroll` reports
    pub scroll_throttle: Duration,
    pub scroll_correction: ScrollCorrection,
    /// Tried in order; the first match is the scroll container
    pub container_selectors: Vec<String>,
    pub discovery_interval: Duration,
    pub discovery_attempts: u32,
    /// Delay between regaining focus and the first restore attempt
    pub restore_delay: Duration,
    pub restore_retry_interval: Duration,
    pub restore_attempts: u32,
    pub window_verify_delay: Duration,
    /// Allowed drift before the window scroll is re-applied
    pub window_tolerance: f64,
}

impl ViewConfig {
    pub const fn correction(&self) -> f64 {
        self.scroll_correction.for_mode(self.mode)
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            scroll_throttle: Duration::from_millis(50),
            scroll_correction: ScrollCorrection::default(),
            container_selectors: [
                ".vditor-reset",
                ".vditor-ir .vditor-reset",
                ".vditor-wysiwyg .vditor-reset",
                ".vditor-ir__preview",
                ".vditor-ir",
                ".vditor",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            discovery_interval: Duration::from_millis(100),
            discovery_attempts: 50,
            restore_delay: Duration::from_millis(10),
            restore_retry_interval: Duration::from_millis(10),
            restore_attempts: 3,
            window_verify_delay: Duration::from_millis(100),
            window_tolerance: 5.0,
        }
    }
}
