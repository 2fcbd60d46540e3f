//! Configuration system for md-web
//!
//! Reads config from ~/.config/md-web/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use md_web_protocol::{CodeHighlight, EditorConfig};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_port: u16,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_port: 9001,
            bind: "127.0.0.1".to_string(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period before an edit is written to disk
    pub persist_debounce_ms: u64,
    pub persist_attempts: u32,
    /// Directory, relative to the document, that pasted images land in
    pub assets_dir: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persist_debounce_ms: 300,
            persist_attempts: 3,
            assets_dir: "assets".to_string(),
        }
    }
}

/// Options forwarded to the editor widget in `open`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSection {
    pub hide_toolbar: bool,
    pub editor_language: String,
    pub show_line_number: bool,
    pub scroll_beyond_last_line: bool,
    pub prevent_mac_option_key: bool,
    /// Overrides the platform reported to the view
    pub platform: Option<String>,
    /// Show the outline panel; the view toggles it with `saveOutline`
    pub outline: bool,
}

impl Default for EditorSection {
    fn default() -> Self {
        let forwarded = EditorConfig::default();
        Self {
            hide_toolbar: forwarded.hide_toolbar,
            editor_language: forwarded.editor_language,
            show_line_number: forwarded.preview_code_highlight.show_line_number,
            scroll_beyond_last_line: forwarded.scroll_beyond_last_line,
            prevent_mac_option_key: forwarded.prevent_mac_option_key,
            platform: None,
            outline: forwarded.outline,
        }
    }
}

impl EditorSection {
    pub fn to_editor_config(&self) -> EditorConfig {
        let defaults = EditorConfig::default();
        EditorConfig {
            hide_toolbar: self.hide_toolbar,
            editor_language: self.editor_language.clone(),
            preview_code_highlight: CodeHighlight {
                show_line_number: self.show_line_number,
            },
            scroll_beyond_last_line: self.scroll_beyond_last_line,
            prevent_mac_option_key: self.prevent_mac_option_key,
            platform: self.platform.clone().unwrap_or(defaults.platform),
            outline: self.outline,
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub editor: EditorSection,
}

const DEFAULT_CONFIG: &str = r#"# md-web Configuration

[server]
ws_port = 9001
bind = "127.0.0.1"

[session]
persist_debounce_ms = 300
persist_attempts = 3
assets_dir = "assets"

[editor]
hide_toolbar = false
editor_language = "en_US"
show_line_number = false
scroll_beyond_last_line = false
prevent_mac_option_key = false
outline = false
"#;

impl Config {
    /// Load configuration from default path, falling back to defaults
    pub fn load() -> Self {
        let config_path = Self::default_config_path();
        if !config_path.exists() {
            return Self::default();
        }
        Self::load_from_path(&config_path).unwrap_or_else(|e| {
            tracing::warn!(path = %config_path.display(), "ignoring config: {:#}", e);
            Self::default()
        })
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("md-web")
            .join("config.toml")
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("parsing config")
    }

    /// Create default config file if it doesn't exist
    pub fn create_default_if_missing() {
        let path = Self::default_config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(&path, DEFAULT_CONFIG);
        }
    }

    pub const fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.session.persist_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.ws_port, 9001);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.session.persist_debounce_ms, 300);
        assert_eq!(config.persist_debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_default_file_matches_defaults() {
        assert_eq!(Config::parse(DEFAULT_CONFIG).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse("[server]\nws_port = 9100\n\n[editor]\nhide_toolbar = true\n").unwrap();
        assert_eq!(config.server.ws_port, 9100);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert!(config.editor.hide_toolbar);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_bad_file_is_an_error() {
        assert!(Config::parse("[server]\nws_port = \"high\"\n").is_err());
    }

    #[test]
    fn test_editor_section_forwarding() {
        let section = EditorSection {
            show_line_number: true,
            platform: Some("darwin".into()),
            outline: true,
            ..EditorSection::default()
        };
        let forwarded = section.to_editor_config();
        assert!(forwarded.preview_code_highlight.show_line_number);
        assert!(forwarded.outline);
        assert_eq!(forwarded.platform, "darwin");
        assert_eq!(forwarded.editor_language, "en_US");

        let native = EditorSection::default().to_editor_config();
        assert_eq!(native.platform, std::env::consts::OS);
    }
}
