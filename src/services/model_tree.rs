//! Model name rules and the tree view over slash-separated model names.
//!
//! `facade/north/v2` is shown as `facade` > `north` > `v2`. Intermediate
//! nodes need not exist as models themselves.

use std::collections::BTreeMap;

use crate::db::Model;
use crate::{Error, Result};

/// Canonical form of a model name.
///
/// Names are trimmed and lower-cased and lose trailing slashes. They may
/// not be empty, start with `/` or `#`, contain `//` or `,`, or have
/// blank path segments.
pub fn normalize_model_name(raw: &str) -> Result<String> {
    let name = raw.trim().to_lowercase();

    if name.starts_with('/') || name.starts_with('#') {
        return Err(Error::Validation(
            "Model names cannot start with '/' or '#'".into(),
        ));
    }
    if name.contains("//") {
        return Err(Error::Validation("Model names cannot contain '//'".into()));
    }
    if name.contains(',') {
        return Err(Error::Validation("Model names cannot contain ','".into()));
    }

    let name = name.trim_end_matches('/').to_string();
    if name.is_empty() {
        return Err(Error::Validation("Model name cannot be empty".into()));
    }
    if name.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(Error::Validation(
            "Model names cannot contain blank segments".into(),
        ));
    }

    Ok(name)
}

/// Last path segment, e.g. `v2` for `facade/north/v2`.
pub fn display_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// One node of the model tree.
#[derive(Debug, Clone)]
pub struct TreeItem {
    /// Segment shown at this level.
    pub name: String,
    /// Path from the root, usable as the next `parent`.
    pub full_name: String,
    pub has_children: bool,
    /// The model whose name is exactly `full_name`, if there is one.
    pub model: Option<Model>,
}

/// Immediate children of `parent` (the root when `None` or empty), sorted
/// by name.
pub fn children(models: &[Model], parent: Option<&str>) -> Vec<TreeItem> {
    let prefix = match parent.map(|p| p.trim().trim_end_matches('/').to_lowercase()) {
        Some(p) if !p.is_empty() => format!("{}/", p),
        _ => String::new(),
    };

    let mut items: BTreeMap<String, TreeItem> = BTreeMap::new();

    for model in models {
        let Some(rest) = model.name.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let (segment, deeper) = match rest.split_once('/') {
            Some((segment, _)) => (segment, true),
            None => (rest, false),
        };

        let item = items.entry(segment.to_string()).or_insert_with(|| TreeItem {
            name: segment.to_string(),
            full_name: format!("{}{}", prefix, segment),
            has_children: false,
            model: None,
        });

        if deeper {
            item.has_children = true;
        } else {
            item.model = Some(model.clone());
        }
    }

    items.into_values().collect()
}
