//! Link opening and local image sources

/// Origin the host serves local resources from
pub const RESOURCE_ORIGIN: &str = "https://file+.vscode-resource.vscode-cdn.net/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Click,
    DoubleClick,
    AuxClick,
}

/// What was clicked, reduced to what link handling needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Anchor { href: String },
    Image { src: String, parent_href: Option<String> },
    /// Link marker text in instant-rendering mode
    LinkMarker { text: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Click {
    pub kind: ClickKind,
    pub ctrl: bool,
    pub meta: bool,
    pub target: ClickTarget,
}

impl Click {
    pub const fn plain(target: ClickTarget) -> Self {
        Self {
            kind: ClickKind::Click,
            ctrl: false,
            meta: false,
            target,
        }
    }
}

/// URL to open for a click, if any
///
/// Link markers open on any click. Anchors and images need the platform
/// modifier, a double click or a middle click.
pub fn link_for_click(click: &Click, mac: bool) -> Option<String> {
    if let ClickTarget::LinkMarker { text } = &click.target {
        return Some(text.clone());
    }

    let compose = if mac { click.meta } else { click.ctrl };
    let special = matches!(click.kind, ClickKind::DoubleClick | ClickKind::AuxClick);
    if !compose && !special {
        return None;
    }

    match &click.target {
        ClickTarget::Anchor { href } => Some(href.clone()),
        ClickTarget::Image { src, parent_href } => match parent_href {
            Some(href) if !href.is_empty() => Some(href.clone()),
            _ => src.contains("http").then(|| src.clone()),
        },
        ClickTarget::LinkMarker { .. } | ClickTarget::Other => None,
    }
}

/// Rewrite a local image source onto [`RESOURCE_ORIGIN`]
///
/// Returns `None` when the source should be left alone.
pub fn rewrite_image_src(src: &str) -> Option<String> {
    if src.starts_with("http") {
        return None;
    }
    if !src.starts_with("vscode-webview-resource") && !src.contains("file:///") {
        return None;
    }
    src.split_once("file:///")
        .map(|(_, path)| format!("{RESOURCE_ORIGIN}{path}"))
}
