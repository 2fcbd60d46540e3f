//! IDE services the view can ask the host for
//!
//! Everything here is outside the document model: opening links, running
//! commands, exports and tooling. Embedders supply their own [`HostServices`];
//! [`TracingServices`] just records the requests.

use std::path::Path;

use async_trait::async_trait;
use md_web_protocol::ExportFormat;
use url::Url;

#[async_trait]
pub trait HostServices: Send + Sync {
    async fn open_link(&self, url: &str) -> anyhow::Result<()>;
    async fn run_command(&self, id: &str) -> anyhow::Result<()>;
    async fn export(&self, document: &Path, format: ExportFormat, without_outline: bool) -> anyhow::Result<()>;
    async fn edit_in_text_editor(&self, document: &Path) -> anyhow::Result<()>;
    async fn open_developer_tools(&self) -> anyhow::Result<()>;
    /// Remember whether the outline panel is shown
    async fn save_outline(&self, enabled: bool) -> anyhow::Result<()>;
}

/// Logs each request and does nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingServices;

#[async_trait]
impl HostServices for TracingServices {
    async fn open_link(&self, url: &str) -> anyhow::Result<()> {
        tracing::info!(url, "open link");
        Ok(())
    }

    async fn run_command(&self, id: &str) -> anyhow::Result<()> {
        tracing::info!(command = id, "run command");
        Ok(())
    }

    async fn export(&self, document: &Path, format: ExportFormat, without_outline: bool) -> anyhow::Result<()> {
        tracing::info!(
            document = %document.display(),
            format = format.as_str(),
            without_outline,
            "export"
        );
        Ok(())
    }

    async fn edit_in_text_editor(&self, document: &Path) -> anyhow::Result<()> {
        tracing::info!(document = %document.display(), "edit as text");
        Ok(())
    }

    async fn open_developer_tools(&self) -> anyhow::Result<()> {
        tracing::info!("developer tools");
        Ok(())
    }

    async fn save_outline(&self, enabled: bool) -> anyhow::Result<()> {
        tracing::info!(enabled, "outline toggled");
        Ok(())
    }
}

/// Turn a link from the document into something the OS can open.
///
/// Absolute URLs pass through. Anything else is a path relative to the
/// document and becomes a `file://` URL.
pub fn resolve_link(document: &Path, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(href) {
        return Some(url.to_string());
    }

    let (path, fragment) = href.split_once('#').map_or((href, None), |(p, f)| (p, Some(f)));
    let base = document.parent()?;
    let target = if path.is_empty() {
        document.to_path_buf()
    } else {
        base.join(path)
    };
    let mut url = Url::from_file_path(&target).ok()?;
    url.set_fragment(fragment);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_links_pass_through() {
        let doc = Path::new("/notes/a.md");
        assert_eq!(
            resolve_link(doc, "https://example.com/x").as_deref(),
            Some("https://example.com/x")
        );
        assert_eq!(
            resolve_link(doc, "mailto:me@example.com").as_deref(),
            Some("mailto:me@example.com")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_links_resolve_against_document() {
        let doc = Path::new("/notes/a.md");
        assert_eq!(
            resolve_link(doc, "b.md").as_deref(),
            Some("file:///notes/b.md")
        );
        assert_eq!(
            resolve_link(doc, "sub/c.md#intro").as_deref(),
            Some("file:///notes/sub/c.md#intro")
        );
        assert_eq!(
            resolve_link(doc, "#top").as_deref(),
            Some("file:///notes/a.md#top")
        );
        assert_eq!(resolve_link(doc, "  "), None);
    }
}
