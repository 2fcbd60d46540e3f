//! Markdown formatting commands from the host

use md_web_protocol::FormatKind;

use crate::surface::EditorWidget;

/// Heading line for `selected`, dropping any existing `#` markers
pub fn heading_text(selected: &str, level: u8) -> String {
    let prefix = "#".repeat(usize::from(level.clamp(1, 6)));
    let hashes = selected.chars().take(6).take_while(|c| *c == '#').count();
    let body = if hashes > 0 {
        selected[hashes..].trim_start()
    } else {
        selected
    };
    format!("{prefix} {body}")
}

/// Wrap `selected` in `marker`, or unwrap it if already wrapped
pub fn toggle_emphasis(selected: &str, marker: &str) -> String {
    let wrapped = selected.len() >= marker.len() * 2 && selected.starts_with(marker) && selected.ends_with(marker);
    if wrapped {
        selected[marker.len()..selected.len() - marker.len()].to_string()
    } else {
        format!("{marker}{selected}{marker}")
    }
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '+']) {
        return rest.trim_start();
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix('.') {
            return rest.trim_start();
        }
    }
    line
}

/// Turn each non-blank line into a list item
pub fn listify(selected: &str, ordered: bool) -> String {
    let marker = if ordered { "1. " } else { "- " };
    selected
        .split('\n')
        .map(|line| {
            let line = line.trim();
            if line.is_empty() {
                String::new()
            } else {
                format!("{marker}{}", strip_list_marker(line))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply `kind` to the widget's selection, or insert its marker at the caret
pub fn apply<W: EditorWidget + ?Sized>(widget: &mut W, kind: FormatKind) {
    widget.focus();
    let selected = widget.selected_text();

    match kind {
        FormatKind::Heading(level) => {
            if selected.is_empty() {
                widget.insert_value(&format!("{} ", "#".repeat(usize::from(level.clamp(1, 6)))));
            } else {
                widget.update_value(&heading_text(&selected, level));
            }
        }
        FormatKind::Bold | FormatKind::Italic => {
            let marker = if kind == FormatKind::Bold { "**" } else { "*" };
            if selected.is_empty() {
                widget.insert_value(&format!("{marker}{marker}"));
            } else {
                widget.update_value(&toggle_emphasis(&selected, marker));
            }
        }
        FormatKind::List { ordered } => {
            if selected.is_empty() {
                widget.insert_value(if ordered { "1. " } else { "- " });
            } else {
                widget.update_value(&listify(&selected, ordered));
            }
        }
    }
    widget.focus();
}
