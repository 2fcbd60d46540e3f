//! Keyboard shortcuts and context menu
//!
//! Translates raw key chords and menu picks into what the view should do.
//! Pure UI actions (copy) never reach the host.

use md_web_protocol::{ExportFormat, ExportRequest};

/// Host command run by the context menu's paste entry
pub const PASTE_COMMAND: &str = "vsc-markdown.paste";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyChord {
    /// Physical key code, e.g. `KeyS`, `F12`
    pub code: String,
    /// Produced key, e.g. `s`
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyChord {
    pub fn new(code: &str, key: &str) -> Self {
        Self {
            code: code.to_string(),
            key: key.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[must_use]
    pub const fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    #[must_use]
    pub const fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    #[must_use]
    pub const fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// The platform's primary modifier: Cmd on macOS, Ctrl elsewhere
    pub const fn is_compose(&self, mac: bool) -> bool {
        if mac {
            self.meta
        } else {
            self.ctrl
        }
    }

    fn is_letter(&self, letter: char) -> bool {
        let mut buf = [0; 4];
        self.key.eq_ignore_ascii_case(letter.encode_utf8(&mut buf))
            || self.code == format!("Key{}", letter.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Switch to the host's plain-text editor
    EditInHost,
    DeveloperTool,
    Save,
    /// Insert the clipboard's text, trimmed, without formatting
    PastePlainText,
    /// Clear the selection before the native paste lands
    PasteOverSelection,
    /// Insert `close` after the caret; the typed opener lands before it
    AutoPair { close: char },
    /// Swallow the event
    Suppress,
    PassThrough,
}

/// Whether a platform string names macOS
pub fn is_mac(platform: &str) -> bool {
    matches!(platform, "darwin" | "macos" | "mac")
}

pub fn classify_key(chord: &KeyChord, mac: bool, prevent_mac_option_key: bool) -> KeyAction {
    // ^⌘E or ^!E
    let edit_in_host = chord.ctrl && !chord.shift && (chord.meta ^ chord.alt) && chord.is_letter('e');
    if edit_in_host {
        return KeyAction::EditInHost;
    }

    if mac
        && prevent_mac_option_key
        && chord.alt
        && chord.shift
        && matches!(chord.code.as_str(), "Digit1" | "Digit2" | "KeyW")
    {
        return KeyAction::Suppress;
    }

    if chord.code == "F12" {
        return KeyAction::DeveloperTool;
    }

    if chord.is_compose(mac) {
        match chord.code.as_str() {
            "KeyS" => return KeyAction::Save,
            "KeyV" if chord.shift => return KeyAction::PastePlainText,
            "KeyV" => return KeyAction::PasteOverSelection,
            _ => {}
        }
    }

    match chord.key.as_str() {
        "(" => KeyAction::AutoPair { close: ')' },
        "{" => KeyAction::AutoPair { close: '}' },
        "\"" => KeyAction::AutoPair { close: '"' },
        _ => KeyAction::PassThrough,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Copy,
    Paste,
    ExportPdf,
    ExportPdfWithoutOutline,
    ExportDocx,
    ExportHtml,
}

impl MenuAction {
    /// Parse a menu entry id
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "copy" => Some(Self::Copy),
            "paste" => Some(Self::Paste),
            "exportPdf" => Some(Self::ExportPdf),
            "exportPdfWithoutOutline" => Some(Self::ExportPdfWithoutOutline),
            "exportDocx" => Some(Self::ExportDocx),
            "exportHtml" => Some(Self::ExportHtml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEffect {
    /// Handled entirely in the view
    Local,
    /// Run a host command, deleting the selection first if asked
    Command { id: &'static str, delete_selection: bool },
    Export(ExportRequest),
}

pub fn menu_effect(action: MenuAction, has_selection: bool) -> MenuEffect {
    match action {
        MenuAction::Copy => MenuEffect::Local,
        MenuAction::Paste => MenuEffect::Command {
            id: PASTE_COMMAND,
            delete_selection: has_selection,
        },
        MenuAction::ExportPdf => MenuEffect::Export(ExportRequest::new(ExportFormat::Pdf)),
        MenuAction::ExportPdfWithoutOutline => {
            MenuEffect::Export(ExportRequest::new(ExportFormat::Pdf).without_outline())
        }
        MenuAction::ExportDocx => MenuEffect::Export(ExportRequest::new(ExportFormat::Docx)),
        MenuAction::ExportHtml => MenuEffect::Export(ExportRequest::new(ExportFormat::Html)),
    }
}
