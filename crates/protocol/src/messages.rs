use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::envelope::ProtocolError;

/// The two cooperating contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Document authority (extension host)
    Host,
    /// Sandboxed editor view
    View,
}

impl Side {
    pub const fn peer(self) -> Self {
        match self {
            Self::Host => Self::View,
            Self::View => Self::Host,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::View => f.write_str("view"),
        }
    }
}

/// Known command names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandName {
    // Handshake
    Init, // init
    Open, // open

    // Document sync
    Update,  // update
    Save,    // save
    DoSave,  // doSave
    Scroll,  // scroll
    RestoreScrollPosition, // restoreScrollPosition

    // Uploads
    Img,          // img
    Uploaded,     // uploaded
    UploadFailed, // uploadFailed

    // Host command surface
    Format,        // format
    OpenLink,      // openLink
    Command,       // command
    Export,        // export
    EditInVSCode,  // editInVSCode
    DeveloperTool, // developerTool
    SaveOutline,   // saveOutline

    Unknown(String),
}

impl CommandName {
    /// Every known command, in wire-table order
    pub const KNOWN: [Self; 17] = [
        Self::Init,
        Self::Open,
        Self::Update,
        Self::Save,
        Self::DoSave,
        Self::Scroll,
        Self::RestoreScrollPosition,
        Self::Img,
        Self::Uploaded,
        Self::UploadFailed,
        Self::Format,
        Self::OpenLink,
        Self::Command,
        Self::Export,
        Self::EditInVSCode,
        Self::DeveloperTool,
        Self::SaveOutline,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "init",
            Self::Open => "open",
            Self::Update => "update",
            Self::Save => "save",
            Self::DoSave => "doSave",
            Self::Scroll => "scroll",
            Self::RestoreScrollPosition => "restoreScrollPosition",
            Self::Img => "img",
            Self::Uploaded => "uploaded",
            Self::UploadFailed => "uploadFailed",
            Self::Format => "format",
            Self::OpenLink => "openLink",
            Self::Command => "command",
            Self::Export => "export",
            Self::EditInVSCode => "editInVSCode",
            Self::DeveloperTool => "developerTool",
            Self::SaveOutline => "saveOutline",
            Self::Unknown(s) => s,
        }
    }

    /// The side allowed to emit this command, `None` for unknown names
    pub const fn sender(&self) -> Option<Side> {
        match self {
            Self::Init
            | Self::Save
            | Self::DoSave
            | Self::Scroll
            | Self::Img
            | Self::OpenLink
            | Self::Command
            | Self::Export
            | Self::EditInVSCode
            | Self::DeveloperTool
            | Self::SaveOutline => Some(Side::View),
            Self::Open
            | Self::Update
            | Self::RestoreScrollPosition
            | Self::Uploaded
            | Self::UploadFailed
            | Self::Format => Some(Side::Host),
            Self::Unknown(_) => None,
        }
    }

    /// Handshake commands may cross the channel before the peer is ready
    pub const fn is_handshake(&self) -> bool {
        matches!(self, Self::Init | Self::Open)
    }
}

impl From<&str> for CommandName {
    fn from(s: &str) -> Self {
        match s {
            "init" => Self::Init,
            "open" => Self::Open,
            "update" => Self::Update,
            "save" => Self::Save,
            "doSave" => Self::DoSave,
            "scroll" => Self::Scroll,
            "restoreScrollPosition" => Self::RestoreScrollPosition,
            "img" => Self::Img,
            "uploaded" => Self::Uploaded,
            "uploadFailed" => Self::UploadFailed,
            "format" => Self::Format,
            "openLink" => Self::OpenLink,
            "command" => Self::Command,
            "export" => Self::Export,
            "editInVSCode" => Self::EditInVSCode,
            "developerTool" => Self::DeveloperTool,
            "saveOutline" => Self::SaveOutline,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editor settings forwarded to the view inside `open`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub hide_toolbar: bool,
    pub editor_language: String,
    pub preview_code_highlight: CodeHighlight,
    pub scroll_beyond_last_line: bool,
    pub prevent_mac_option_key: bool,
    pub platform: String,
    /// Outline panel shown next to the document
    pub outline: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            hide_toolbar: false,
            editor_language: "en_US".to_string(),
            preview_code_highlight: CodeHighlight::default(),
            scroll_beyond_last_line: false,
            prevent_mac_option_key: false,
            platform: std::env::consts::OS.to_string(),
            outline: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeHighlight {
    pub show_line_number: bool,
}

/// `open`: host -> view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub content: String,
    pub root_path: String,
    #[serde(default)]
    pub config: EditorConfig,
    #[serde(default)]
    pub scroll_top: f64,
    #[serde(default)]
    pub revision: u64,
}

/// `update`: host -> view, full content replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub content: String,
    pub revision: u64,
}

/// `save` / `doSave`: view -> host
///
/// The view tags edits with the revision of the content it last received.
/// A bare string is accepted as an untagged edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditPayload {
    Tagged {
        content: String,
        #[serde(rename = "baseRevision")]
        base_revision: u64,
    },
    Bare(String),
}

impl EditPayload {
    pub fn tagged(content: impl Into<String>, base_revision: u64) -> Self {
        Self::Tagged {
            content: content.into(),
            base_revision,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Tagged { content, .. } | Self::Bare(content) => content,
        }
    }

    pub const fn base_revision(&self) -> Option<u64> {
        match self {
            Self::Tagged { base_revision, .. } => Some(*base_revision),
            Self::Bare(_) => None,
        }
    }

    pub fn into_content(self) -> String {
        match self {
            Self::Tagged { content, .. } | Self::Bare(content) => content,
        }
    }
}

/// `scroll`: view -> host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPayload {
    pub scroll_top: f64,
}

/// `img`: view -> host
///
/// Carried as a msgpack map with a binary `data` field; see
/// [`UploadRequest::into_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub token: u64,
    pub mime: String,
    pub data: Vec<u8>,
}

impl UploadRequest {
    /// Convert to `MessagePack` Value, moving the bytes
    pub fn into_value(self) -> Value {
        Value::Map(vec![
            (Value::String("token".into()), Value::Integer(self.token.into())),
            (Value::String("mime".into()), Value::String(self.mime.into())),
            (Value::String("data".into()), Value::Binary(self.data)),
        ])
    }
}

impl TryFrom<Value> for UploadRequest {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Map(entries) = value else {
            return Err(ProtocolError::payload(&CommandName::Img, "expected a map"));
        };

        let mut token = None;
        let mut mime = None;
        let mut data = None;
        for (key, value) in entries {
            match key.as_str() {
                Some("token") => token = value.as_u64(),
                Some("mime") => mime = value.as_str().map(ToString::to_string),
                Some("data") => match value {
                    Value::Binary(bytes) => data = Some(bytes),
                    // Binary strings from a JS FileReader arrive as str
                    Value::String(s) => data = Some(binary_string_bytes(s)?),
                    _ => {}
                },
                _ => {}
            }
        }

        Ok(Self {
            token: token.ok_or_else(|| ProtocolError::payload(&CommandName::Img, "missing token"))?,
            mime: mime.unwrap_or_else(|| "application/octet-stream".to_string()),
            data: data.ok_or_else(|| ProtocolError::payload(&CommandName::Img, "missing data"))?,
        })
    }
}

/// Bytes of a binary string, one char per byte
fn binary_string_bytes(s: rmpv::Utf8String) -> Result<Vec<u8>, ProtocolError> {
    let not_binary = || ProtocolError::payload(&CommandName::Img, "data is not a binary string");
    let s = s.into_str().ok_or_else(not_binary)?;
    s.chars().map(|c| u8::try_from(c).map_err(|_| not_binary())).collect()
}

/// `uploaded`: host -> view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResolved {
    pub token: u64,
    pub uri: String,
}

/// `uploadFailed`: host -> view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub token: u64,
    pub reason: String,
}

/// `export`: view -> host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_outline: Option<bool>,
}

impl ExportRequest {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            kind: format.as_str().to_string(),
            without_outline: None,
        }
    }

    #[must_use]
    pub const fn without_outline(mut self) -> Self {
        self.without_outline = Some(true);
        self
    }

    pub fn format(&self) -> Option<ExportFormat> {
        ExportFormat::parse(&self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Docx,
    Html,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Html => "html",
        }
    }
}

/// `format`: host -> view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRequest {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl FormatRequest {
    pub fn new(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Heading(level) => Self {
                kind: "heading".to_string(),
                level: Some(level),
            },
            FormatKind::Bold => Self::named("bold"),
            FormatKind::Italic => Self::named("italic"),
            FormatKind::List { ordered: false } => Self::named("list"),
            FormatKind::List { ordered: true } => Self::named("orderedList"),
        }
    }

    fn named(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            level: None,
        }
    }

    pub fn kind(&self) -> Option<FormatKind> {
        match self.kind.as_str() {
            "heading" => Some(FormatKind::Heading(self.level.unwrap_or(1).clamp(1, 6))),
            "bold" => Some(FormatKind::Bold),
            "italic" => Some(FormatKind::Italic),
            "list" => Some(FormatKind::List { ordered: false }),
            "orderedList" => Some(FormatKind::List { ordered: true }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Heading(u8),
    Bold,
    Italic,
    List { ordered: bool },
}
