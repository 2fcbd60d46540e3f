//! Toolbar layout handed to the widget

use serde::{Deserialize, Serialize};

const DEFAULT_TIP: &str = "e";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolItem {
    pub name: String,
    pub tip_position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolbar: Option<Vec<ToolItem>>,
}

/// Loose toolbar entry before normalization
#[derive(Debug, Clone)]
pub enum ToolEntry {
    Name(&'static str),
    Group {
        name: &'static str,
        tip_position: Option<&'static str>,
        toolbar: Vec<ToolEntry>,
    },
}

impl ToolEntry {
    fn normalize(&self) -> ToolItem {
        match self {
            Self::Name(name) => ToolItem {
                name: (*name).to_string(),
                tip_position: DEFAULT_TIP.to_string(),
                toolbar: None,
            },
            Self::Group {
                name,
                tip_position,
                toolbar,
            } => ToolItem {
                name: (*name).to_string(),
                tip_position: tip_position.unwrap_or(DEFAULT_TIP).to_string(),
                toolbar: Some(toolbar.iter().map(Self::normalize).collect()),
            },
        }
    }
}

/// Ordered, nested toolbar; read-only once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolbarSpec(Vec<ToolItem>);

impl ToolbarSpec {
    pub fn from_entries(entries: &[ToolEntry]) -> Self {
        Self(entries.iter().map(ToolEntry::normalize).collect())
    }

    /// outline | undo redo | check table quote link strike | more
    pub fn markdown_default() -> Self {
        use ToolEntry::{Group, Name};
        Self::from_entries(&[
            Name("outline"),
            Name("|"),
            Name("undo"),
            Name("redo"),
            Name("|"),
            Name("check"),
            Name("table"),
            Name("quote"),
            Name("link"),
            Name("strike"),
            Group {
                name: "more",
                tip_position: None,
                toolbar: vec![Name("edit-mode"), Name("preview")],
            },
        ])
    }

    pub fn items(&self) -> &[ToolItem] {
        &self.0
    }

    /// Depth-first item names
    pub fn names(&self) -> Vec<&str> {
        fn walk<'a>(items: &'a [ToolItem], out: &mut Vec<&'a str>) {
            for item in items {
                out.push(&item.name);
                if let Some(children) = &item.toolbar {
                    walk(children, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.0, &mut out);
        out
    }
}
