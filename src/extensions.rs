//! Extension matching: decides which files are compiled as templates.

use serde::{Deserialize, Serialize};

/// The `extensions` option as bundlers pass it: either the list itself or a
/// record wrapping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionsOption {
    List(Vec<String>),
    Record {
        #[serde(default)]
        extensions: Option<Vec<String>>,
    },
}

/// Pick the extension set for one file, lower-cased for case-insensitive
/// matching. Falls back to `defaults` when the option names no list.
pub fn resolve_extensions(option: Option<&ExtensionsOption>, defaults: &[String]) -> Vec<String> {
    let chosen: &[String] = match option {
        Some(ExtensionsOption::List(list)) => list,
        Some(ExtensionsOption::Record {
            extensions: Some(list),
        }) => list,
        Some(ExtensionsOption::Record { extensions: None }) | None => defaults,
    };

    chosen.iter().map(|ext| ext.to_lowercase()).collect()
}

/// Extension of the final path segment, including the leading dot.
///
/// A dot that starts the segment (`.twig`, `..`) does not begin an extension.
pub fn extension_of(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => &name[idx..],
        _ => "",
    }
}

pub fn is_eligible(path: &str, extensions: &[String]) -> bool {
    let ext = extension_of(path).to_lowercase();
    !ext.is_empty() && extensions.iter().any(|candidate| *candidate == ext)
}
