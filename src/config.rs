//! Transform configuration.
//!
//! A [`ConfigContext`] holds the [`Config`] shared by every file of a build.
//! Each eligible file merges its [`TransformOptions`] into the context before
//! buffering, and reads the context again when it finalizes.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::extensions::ExtensionsOption;

pub const DEFAULT_EXTENSIONS: [&str; 2] = [".twig", ".html"];

// ═══════════════════════════════════════════════════════════════════════════════
// MINIFY OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Switches understood by [`crate::minify::HtmlMinifier`].
///
/// Keys missing from a user-supplied record are `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinifyOptions {
    pub remove_comments: bool,
    pub collapse_whitespace: bool,
    pub conservative_collapse: bool,
    pub preserve_line_breaks: bool,
    pub collapse_boolean_attributes: bool,
    pub remove_attribute_quotes: bool,
    pub remove_redundant_attributes: bool,
    pub remove_empty_attributes: bool,
    pub remove_style_link_type_attributes: bool,
    pub remove_optional_tags: bool,
    pub remove_ignored: bool,
    pub remove_empty_elements: bool,
    pub lint: bool,
    pub keep_closing_slash: bool,
    pub case_sensitive: bool,
    #[serde(rename = "minifyURLs")]
    pub minify_urls: bool,
}

impl MinifyOptions {
    /// The options a fresh configuration starts with.
    pub fn recommended() -> Self {
        MinifyOptions {
            remove_comments: true,
            collapse_whitespace: true,
            remove_attribute_quotes: true,
            ..MinifyOptions::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinifySetting {
    Disabled,
    Enabled(MinifyOptions),
}

impl MinifySetting {
    pub fn options(&self) -> Option<&MinifyOptions> {
        match self {
            MinifySetting::Enabled(options) => Some(options),
            MinifySetting::Disabled => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub extensions: Vec<String>,
    pub minify: MinifySetting,
    pub relative_path: bool,
    pub replace_paths: Option<IndexMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            minify: MinifySetting::Enabled(MinifyOptions::recommended()),
            relative_path: false,
            replace_paths: None,
        }
    }
}

impl Config {
    /// Overwrite each setting the options explicitly supply. Extensions are
    /// never stored; they only decide eligibility of the file that carries them.
    pub fn merge(&mut self, options: &TransformOptions) {
        if let Some(minify) = options.minify {
            self.minify = minify;
        }
        if let Some(relative_path) = options.relative_path {
            self.relative_path = relative_path;
        }
        if let Some(replace_paths) = &options.replace_paths {
            self.replace_paths = replace_paths.clone();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-INVOCATION OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Options handed to one transform invocation. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub extensions: Option<ExtensionsOption>,
    pub minify: Option<MinifySetting>,
    pub relative_path: Option<bool>,
    /// `Some(None)` clears a previously configured mapping.
    pub replace_paths: Option<Option<IndexMap<String, String>>>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(ExtensionsOption::List(
            extensions.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_minify(mut self, minify: MinifySetting) -> Self {
        self.minify = Some(minify);
        self
    }

    pub fn with_relative_path(mut self, relative_path: bool) -> Self {
        self.relative_path = Some(relative_path);
        self
    }

    pub fn with_replace_paths<I, K, V>(mut self, replace_paths: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.replace_paths = Some(Some(
            replace_paths
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }

    /// Read options from the loosely typed record a bundler passes along.
    ///
    /// Values of the wrong shape are ignored rather than rejected.
    pub fn from_value(value: &Value) -> Self {
        let Some(record) = value.as_object() else {
            if !value.is_null() {
                debug!(options = %value, "ignoring non-object transform options");
            }
            return TransformOptions::default();
        };

        let extensions = match record.get("extensions") {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<ExtensionsOption>(raw.clone()) {
                Ok(option) => Some(option),
                Err(e) => {
                    debug!(error = %e, "ignoring malformed extensions option");
                    None
                }
            },
        };

        let minify = match record.get("minify") {
            None | Some(Value::Null) => None,
            Some(raw @ Value::Object(_)) => {
                match serde_json::from_value::<MinifyOptions>(raw.clone()) {
                    Ok(options) => Some(MinifySetting::Enabled(options)),
                    Err(e) => {
                        debug!(error = %e, "ignoring malformed minify options");
                        None
                    }
                }
            }
            // Any scalar, `true` included, turns minification off.
            Some(_) => Some(MinifySetting::Disabled),
        };

        let relative_path = match record.get("relativePath") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(is_truthy(raw)),
        };

        let replace_paths = match record.get("replacePaths") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::Object(map)) => Some(Some(
                map.iter()
                    .map(|(search, alias)| {
                        let alias = alias
                            .as_str()
                            .map(str::to_owned)
                            .unwrap_or_else(|| alias.to_string());
                        (search.clone(), alias)
                    })
                    .collect(),
            )),
            Some(other) => {
                debug!(replace_paths = %other, "ignoring non-mapping replacePaths");
                None
            }
        };

        TransformOptions {
            extensions,
            minify,
            relative_path,
            replace_paths,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref GLOBAL_CONTEXT: ConfigContext = ConfigContext::new();
}

/// Configuration shared by every file transformed through the same context.
///
/// Single-writer contract: merges are last-write-wins and are not isolated per
/// file. A file reads the context when it finalizes, so a file still buffering
/// while another file merges different options compiles with the newer ones.
/// Builds that need per-file isolation must give each file its own context.
#[derive(Debug, Clone, Default)]
pub struct ConfigContext {
    inner: Arc<RwLock<Config>>,
}

impl ConfigContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        ConfigContext {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// The process-wide context used by [`crate::transform_file`] and
    /// [`crate::Twigify::new`].
    pub fn global() -> Self {
        GLOBAL_CONTEXT.clone()
    }

    pub fn snapshot(&self) -> Config {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn merge(&self, options: &TransformOptions) {
        let mut config = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        config.merge(options);
        debug!(
            minify = config.minify.options().is_some(),
            relative_path = config.relative_path,
            replace_paths = config.replace_paths.as_ref().map_or(0, |m| m.len()),
            "merged transform options"
        );
    }

    pub fn default_extensions(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .extensions
            .clone()
    }

    pub fn is_same(&self, other: &ConfigContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.extensions, vec![".twig", ".html"]);
        assert!(!config.relative_path);
        assert!(config.replace_paths.is_none());
        let options = config.minify.options().copied().unwrap();
        assert!(options.remove_comments);
        assert!(options.collapse_whitespace);
        assert!(options.remove_attribute_quotes);
        assert!(!options.remove_optional_tags);
    }

    #[test]
    fn test_minify_record_missing_keys_default_false() {
        let options = TransformOptions::from_value(&json!({
            "minify": { "removeComments": true, "minifyURLs": true }
        }));
        let Some(MinifySetting::Enabled(minify)) = options.minify else {
            panic!("expected enabled minify, got {:?}", options.minify);
        };
        assert!(minify.remove_comments);
        assert!(minify.minify_urls);
        assert!(!minify.collapse_whitespace);
    }

    #[test]
    fn test_minify_scalar_disables() {
        for raw in [json!(false), json!(true), json!(0), json!("yes")] {
            let options = TransformOptions::from_value(&json!({ "minify": raw }));
            assert_eq!(options.minify, Some(MinifySetting::Disabled));
        }
        let options = TransformOptions::from_value(&json!({ "minify": null }));
        assert_eq!(options.minify, None);
    }

    #[test]
    fn test_relative_path_truthiness() {
        let on = TransformOptions::from_value(&json!({ "relativePath": 1 }));
        assert_eq!(on.relative_path, Some(true));
        let off = TransformOptions::from_value(&json!({ "relativePath": "" }));
        assert_eq!(off.relative_path, Some(false));
        let absent = TransformOptions::from_value(&json!({}));
        assert_eq!(absent.relative_path, None);
    }

    #[test]
    fn test_replace_paths_preserves_declaration_order() {
        let options = TransformOptions::from_value(&json!({
            "replacePaths": { "/zeta": "@z", "/alpha": "@a" }
        }));
        let map = options.replace_paths.unwrap().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["/zeta", "/alpha"]);
    }

    #[test]
    fn test_replace_paths_shapes() {
        let cleared = TransformOptions::from_value(&json!({ "replacePaths": null }));
        assert_eq!(cleared.replace_paths, Some(None));
        let ignored = TransformOptions::from_value(&json!({ "replacePaths": "/app" }));
        assert_eq!(ignored.replace_paths, None);
    }

    #[test]
    fn test_merge_keeps_unspecified_settings() {
        let context = ConfigContext::new();
        context.merge(
            &TransformOptions::new()
                .with_relative_path(true)
                .with_minify(MinifySetting::Disabled),
        );
        context.merge(&TransformOptions::new().with_replace_paths([("/app", "@app")]));

        let config = context.snapshot();
        assert!(config.relative_path);
        assert_eq!(config.minify, MinifySetting::Disabled);
        assert_eq!(config.replace_paths.unwrap().get("/app").unwrap(), "@app");
    }

    #[test]
    fn test_contexts_share_state_through_clones() {
        let context = ConfigContext::new();
        let other = context.clone();
        other.merge(&TransformOptions::new().with_relative_path(true));
        assert!(context.snapshot().relative_path);
        assert!(context.is_same(&other));
        assert!(!context.is_same(&ConfigContext::new()));
    }

    #[test]
    fn test_non_object_options_are_empty() {
        assert_eq!(
            TransformOptions::from_value(&json!("templates")),
            TransformOptions::default()
        );
    }
}
