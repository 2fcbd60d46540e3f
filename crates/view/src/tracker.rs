//! Cursor, selection, scroll and focus preservation
//!
//! The tracker snapshots [`ViewState`] when the view is suspended (window blur
//! or a host content replacement) and replays it on resumption. Replay runs
//! an ordered chain of strategies; each is tried only if the previous one
//! failed, and the chain is retried a bounded number of times before
//! degrading to a caret at the captured cursor offset, then to plain focus.
//!
//! Every capture bumps a generation counter. Deferred work carries the
//! generation it was scheduled for and is discarded if a newer capture has
//! happened since.

use tokio::time::Instant;
use tracing::{debug, trace};

use md_web_protocol::RateGate;

use crate::surface::{ContainerId, SelectionRange, Surface, TextSpan};

/// A selection captured in two forms at the same instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedSelection {
    pub live: SelectionRange,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub cursor_position: Option<usize>,
    pub selection: Option<CapturedSelection>,
    pub scroll_offset: f64,
    pub has_focus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTier {
    /// Re-apply the captured node range
    LiveRange,
    /// Re-resolve the captured text span against the current nodes
    ClonedRange,
    /// Collapse the caret at the captured cursor offset
    Caret,
    /// Focus the editor and leave the caret where the widget puts it
    PlainFocus,
}

impl RestoreTier {
    pub const CHAIN: [Self; 2] = [Self::LiveRange, Self::ClonedRange];

    pub fn attempt<S: Surface + ?Sized>(
        self,
        surface: &mut S,
        selection: &CapturedSelection,
        cursor: Option<usize>,
    ) -> bool {
        match self {
            Self::LiveRange => surface.apply_selection(&selection.live),
            Self::ClonedRange => surface
                .range_at(selection.span)
                .is_some_and(|range| surface.apply_selection(&range)),
            Self::Caret => {
                let Some(range) = cursor.and_then(|at| surface.range_at(TextSpan::caret(at))) else {
                    return false;
                };
                if !surface.apply_selection(&range) {
                    return false;
                }
                surface.focus_editor();
                true
            }
            Self::PlainFocus => {
                surface.focus_editor();
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    Restored(RestoreTier),
    /// Every tier failed; try again later with the same generation
    Retry { generation: u64 },
    /// A newer capture replaced this one
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollOutcome {
    Skipped,
    Applied {
        container: Option<ContainerId>,
        target: f64,
    },
}

#[derive(Debug)]
struct PendingRestore {
    generation: u64,
    selection: CapturedSelection,
    cursor: Option<usize>,
    attempts: u32,
}

#[derive(Debug)]
pub struct ViewStateTracker {
    generation: u64,
    snapshot: Option<ViewState>,
    pending: Option<PendingRestore>,
    selectors: Vec<String>,
    max_attempts: u32,
}

impl ViewStateTracker {
    pub fn new(selectors: Vec<String>, max_attempts: u32) -> Self {
        Self {
            generation: 0,
            snapshot: None,
            pending: None,
            selectors,
            max_attempts: max_attempts.max(1),
        }
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn snapshot(&self) -> Option<&ViewState> {
        self.snapshot.as_ref()
    }

    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Snapshot the surface, superseding any earlier snapshot
    ///
    /// A selection whose anchor or focus lies outside the editor is not
    /// captured.
    pub fn capture<S: Surface + ?Sized>(&mut self, surface: &S, cursor_position: Option<usize>) -> u64 {
        self.generation += 1;
        self.pending = None;

        let selection = surface
            .selection()
            .filter(|range| surface.editor_contains(range.anchor.node) && surface.editor_contains(range.focus.node))
            .and_then(|live| surface.span_of(&live).map(|span| CapturedSelection { live, span }));

        let scroll_offset = self.find_container(surface).map_or_else(
            || surface.window_scroll_top(),
            |container| surface.container_scroll_top(container),
        );

        let state = ViewState {
            cursor_position,
            selection,
            scroll_offset,
            has_focus: surface.editor_focused(),
        };
        debug!(
            generation = self.generation,
            selection = state.selection.is_some(),
            scroll = state.scroll_offset,
            "captured view state"
        );
        self.snapshot = Some(state);
        self.generation
    }

    /// Window regained focus: focus the editor and arm selection restore
    ///
    /// Returns the generation to hand back to [`Self::restore_pending`], or
    /// `None` when there is nothing to restore.
    pub fn resume<S: Surface + ?Sized>(&mut self, surface: &mut S) -> Option<u64> {
        let state = self.snapshot.take()?;
        surface.focus_editor();
        self.arm(state)
    }

    /// Content was replaced underneath the editor: put the scroll offset
    /// back and arm selection restore, refocusing only if the editor had focus
    pub fn reattach<S: Surface + ?Sized>(&mut self, surface: &mut S) -> Option<u64> {
        let state = self.snapshot.take()?;
        match self.find_container(surface) {
            Some(container) => surface.scroll_container_to(container, state.scroll_offset),
            None => surface.scroll_window_to(state.scroll_offset),
        }
        if state.has_focus {
            surface.focus_editor();
        }
        self.arm(state)
    }

    fn arm(&mut self, state: ViewState) -> Option<u64> {
        let selection = state.selection?;
        self.pending = Some(PendingRestore {
            generation: self.generation,
            selection,
            cursor: state.cursor_position,
            attempts: 0,
        });
        Some(self.generation)
    }

    /// Run the restoration chain once for `generation`
    pub fn restore_pending<S: Surface + ?Sized>(&mut self, surface: &mut S, generation: u64) -> RestoreStep {
        let current = self.generation;
        let Some(pending) = self.pending.as_mut() else {
            return RestoreStep::Superseded;
        };
        if pending.generation != generation || generation != current {
            trace!(generation, current, "restore superseded");
            return RestoreStep::Superseded;
        }

        pending.attempts += 1;
        for tier in RestoreTier::CHAIN {
            if tier.attempt(surface, &pending.selection, pending.cursor) {
                debug!(generation, ?tier, attempts = pending.attempts, "selection restored");
                self.pending = None;
                return RestoreStep::Restored(tier);
            }
        }

        if pending.attempts < self.max_attempts {
            return RestoreStep::Retry { generation };
        }

        let (selection, cursor) = (pending.selection, pending.cursor);
        self.pending = None;
        for tier in [RestoreTier::Caret, RestoreTier::PlainFocus] {
            if tier.attempt(surface, &selection, cursor) {
                debug!(generation, ?tier, "selection lost, fell back");
                return RestoreStep::Restored(tier);
            }
        }
        RestoreStep::Restored(RestoreTier::PlainFocus)
    }

    pub fn find_container<S: Surface + ?Sized>(&self, surface: &S) -> Option<ContainerId> {
        self.selectors.iter().find_map(|selector| surface.find_container(selector))
    }

    /// Scroll to `top` plus `correction`
    ///
    /// Non-positive (or NaN) targets are ignored. The first container found
    /// is scrolled, and the window is always scrolled as well.
    pub fn scroll_editor<S: Surface + ?Sized>(&self, surface: &mut S, top: f64, correction: f64) -> ScrollOutcome {
        if top.is_nan() || top <= 0.0 {
            trace!(top, "scroll restore skipped");
            return ScrollOutcome::Skipped;
        }

        let target = top + correction;
        let container = self.find_container(surface);
        if let Some(container) = container {
            surface.scroll_container_to(container, target);
        }
        surface.scroll_window_to(target);
        debug!(top, target, container = container.is_some(), "scroll restored");
        ScrollOutcome::Applied { container, target }
    }

    /// Re-apply the window scroll if it drifted from `target`
    pub fn verify_window<S: Surface + ?Sized>(surface: &mut S, target: f64, tolerance: f64) -> bool {
        let current = surface.window_scroll_top();
        if (current - target).abs() > tolerance {
            debug!(current, target, "window scroll drifted, forcing");
            surface.force_window_scroll(target);
            true
        } else {
            false
        }
    }
}

/// Throttled scroll reporting
pub struct ScrollReporter {
    gate: Box<dyn RateGate + Send>,
    correction: f64,
}

impl ScrollReporter {
    pub fn new(gate: Box<dyn RateGate + Send>, correction: f64) -> Self {
        Self { gate, correction }
    }

    /// Offset to report for a raw scroll position, if the gate admits it
    pub fn report(&mut self, raw_top: f64, now: Instant) -> Option<f64> {
        self.gate.admit(now).then(|| raw_top - self.correction)
    }
}

impl std::fmt::Debug for ScrollReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollReporter")
            .field("correction", &self.correction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderMode, ViewConfig};
    use crate::headless::{HeadlessFactory, HeadlessDriver};
    use crate::surface::{EditorWidget, Frontend, WidgetCallbacks, WidgetConfig, WidgetFactory};
    use md_web_protocol::IntervalGate;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn setup(content: &str, deferred: bool) -> (Box<dyn Frontend>, HeadlessDriver, ViewStateTracker) {
        let (factory, driver) = HeadlessFactory::new();
        let mut factory = if deferred {
            factory.with_deferred_containers()
        } else {
            factory
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = WidgetConfig {
            mode: RenderMode::Ir,
            language: "en_US".into(),
            toolbar: None,
            tab: "\t".into(),
            math_engine: "KaTeX".into(),
            code_line_numbers: false,
            outline: false,
            resource_path: String::new(),
            value: content.into(),
        };
        let editor = factory.create(config, WidgetCallbacks::new(tx));
        let view = ViewConfig::default();
        (editor, driver, ViewStateTracker::new(view.container_selectors, view.restore_attempts))
    }

    #[test]
    fn test_blur_focus_restores_live_range() {
        let (mut ed, driver, mut tracker) = setup("# Hello\nWorld", false);
        driver.select(TextSpan::new(8, 13));
        ed.focus();

        tracker.capture(ed.as_ref(), ed.cursor_position());
        driver.blur();
        driver.select(TextSpan::caret(0));

        let gen = tracker.resume(ed.as_mut()).unwrap();
        assert!(driver.focused());
        assert_eq!(
            tracker.restore_pending(ed.as_mut(), gen),
            RestoreStep::Restored(RestoreTier::LiveRange)
        );
        assert_eq!(driver.selection_span(), Some(TextSpan::new(8, 13)));
    }

    #[test]
    fn test_cloned_range_after_nodes_replaced() {
        let (mut ed, driver, mut tracker) = setup("alpha\nbeta", false);
        driver.select(TextSpan::new(6, 10));
        tracker.capture(ed.as_ref(), None);
        ed.set_value("alpha\nbeta");
        let gen = tracker.reattach(ed.as_mut()).unwrap();
        assert_eq!(
            tracker.restore_pending(ed.as_mut(), gen),
            RestoreStep::Restored(RestoreTier::ClonedRange)
        );
        assert_eq!(driver.selected_text(), "beta");
    }

    #[test]
    fn test_retry_then_plain_focus() {
        let (mut ed, driver, mut tracker) = setup("text", false);
        driver.select(TextSpan::new(0, 4));
        tracker.capture(ed.as_ref(), None);
        driver.blur();
        driver.reject_next_selection_applies(100);

        let gen = tracker.resume(ed.as_mut()).unwrap();
        assert_eq!(tracker.restore_pending(ed.as_mut(), gen), RestoreStep::Retry { generation: gen });
        assert_eq!(tracker.restore_pending(ed.as_mut(), gen), RestoreStep::Retry { generation: gen });
        assert_eq!(
            tracker.restore_pending(ed.as_mut(), gen),
            RestoreStep::Restored(RestoreTier::PlainFocus)
        );
        assert!(driver.focused());
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_lost_selection_falls_back_to_cursor() {
        let (mut ed, driver, mut tracker) = setup("text text", false);
        driver.select(TextSpan::new(0, 4));
        tracker.capture(ed.as_ref(), Some(2));
        driver.blur();
        // Two applies per attempt, three attempts
        driver.reject_next_selection_applies(6);

        let gen = tracker.resume(ed.as_mut()).unwrap();
        assert_eq!(tracker.restore_pending(ed.as_mut(), gen), RestoreStep::Retry { generation: gen });
        assert_eq!(tracker.restore_pending(ed.as_mut(), gen), RestoreStep::Retry { generation: gen });
        assert_eq!(
            tracker.restore_pending(ed.as_mut(), gen),
            RestoreStep::Restored(RestoreTier::Caret)
        );
        assert_eq!(driver.selection_span(), Some(TextSpan::caret(2)));
        assert!(driver.focused());
    }

    #[test]
    fn test_retry_succeeds_when_widget_settles() {
        let (mut ed, driver, mut tracker) = setup("text", false);
        driver.select(TextSpan::new(1, 3));
        tracker.capture(ed.as_ref(), None);
        driver.reject_next_selection_applies(2);

        let gen = tracker.resume(ed.as_mut()).unwrap();
        assert_eq!(tracker.restore_pending(ed.as_mut(), gen), RestoreStep::Retry { generation: gen });
        assert_eq!(
            tracker.restore_pending(ed.as_mut(), gen),
            RestoreStep::Restored(RestoreTier::LiveRange)
        );
    }

    #[test]
    fn test_selection_outside_editor_is_not_captured() {
        let (mut ed, driver, mut tracker) = setup("text", false);
        driver.select_in_chrome();
        tracker.capture(ed.as_ref(), None);
        assert!(tracker.snapshot().unwrap().selection.is_none());

        assert_eq!(tracker.resume(ed.as_mut()), None);
        assert!(driver.focused());
    }

    #[test]
    fn test_newer_capture_supersedes() {
        let (mut ed, driver, mut tracker) = setup("text", false);
        driver.select(TextSpan::new(0, 2));
        tracker.capture(ed.as_ref(), None);
        let old = tracker.resume(ed.as_mut()).unwrap();

        driver.select(TextSpan::new(2, 4));
        tracker.capture(ed.as_ref(), None);
        assert_eq!(tracker.restore_pending(ed.as_mut(), old), RestoreStep::Superseded);

        // The snapshot is consumed once
        let new = tracker.resume(ed.as_mut()).unwrap();
        assert!(new > old);
        assert_eq!(tracker.resume(ed.as_mut()), None);
    }

    #[test]
    fn test_scroll_editor_targets() {
        let (mut ed, driver, tracker) = setup("text", false);
        assert_eq!(tracker.scroll_editor(ed.as_mut(), 0.0, 70.0), ScrollOutcome::Skipped);
        assert_eq!(tracker.scroll_editor(ed.as_mut(), -5.0, 70.0), ScrollOutcome::Skipped);
        assert_eq!(tracker.scroll_editor(ed.as_mut(), f64::NAN, 70.0), ScrollOutcome::Skipped);
        assert!(driver.window_scroll().abs() < f64::EPSILON);

        let outcome = tracker.scroll_editor(ed.as_mut(), 130.0, 70.0);
        assert!(matches!(outcome, ScrollOutcome::Applied { container: Some(_), .. }));
        assert_eq!(driver.container_scroll(".vditor-reset"), Some(200.0));
        assert!((driver.window_scroll() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scroll_without_container_uses_window() {
        let (mut ed, driver, tracker) = setup("text", true);
        let outcome = tracker.scroll_editor(ed.as_mut(), 10.0, 70.0);
        assert_eq!(
            outcome,
            ScrollOutcome::Applied {
                container: None,
                target: 80.0
            }
        );
        assert!((driver.window_scroll() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_verify_window_reapplies_on_drift() {
        let (mut ed, driver, tracker) = setup("text", false);
        driver.ignore_next_window_scrolls(1);
        tracker.scroll_editor(ed.as_mut(), 100.0, 70.0);
        assert!(ViewStateTracker::verify_window(ed.as_mut(), 170.0, 5.0));
        assert!((driver.window_scroll() - 170.0).abs() < f64::EPSILON);
        assert!(!ViewStateTracker::verify_window(ed.as_mut(), 173.0, 5.0));
    }

    #[test]
    fn test_reporter_throttles_and_corrects() {
        let mut reporter = ScrollReporter::new(Box::new(IntervalGate::new(Duration::from_millis(50))), 70.0);
        let start = Instant::now();
        assert_eq!(reporter.report(270.0, start), Some(200.0));
        assert_eq!(reporter.report(280.0, start + Duration::from_millis(20)), None);
        assert_eq!(reporter.report(290.0, start + Duration::from_millis(60)), Some(220.0));
    }
}
