//! Pending destination state for one content type.

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Text(String),
    Json(Value),
    /// Binary asset whose bytes are only fetched once a diff proves it changed.
    Placeholder,
}

impl FileContent {
    /// The exact bytes the destination would store, or `None` for a placeholder.
    ///
    /// JSON is pretty-printed; `serde_json` maps keep keys sorted, so the same
    /// record always renders to the same text regardless of source field order.
    pub fn render(&self) -> Option<String> {
        match self {
            FileContent::Text(text) => Some(text.clone()),
            FileContent::Json(value) => {
                Some(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
            }
            FileContent::Placeholder => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, FileContent::Placeholder)
    }
}

/// Repository-relative path (below the content type's prefix) -> content.
///
/// Ordered so that diff requests are deterministic. Inserting an existing path
/// overwrites it; slugs are unique within one snapshot so this only matters for
/// inconsistent source data.
pub type FileMap = BTreeMap<String, FileContent>;

/// Joins a content type prefix and a relative path.
pub fn join_path(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Inverse of [`join_path`]: the part of `path` below `prefix`.
pub fn relative_path<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    path.strip_prefix(prefix)?.strip_prefix('/')
}
