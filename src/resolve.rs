//! Identifier resolution for compiled templates.
//!
//! The identifier is the key the runtime uses to find a template when another
//! template includes it.

use indexmap::IndexMap;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateId {
    /// Registered under this exact string.
    Literal(String),
    /// Registered under the module's own file and directory, known only once
    /// the bundle is loaded.
    Deferred,
}

pub fn resolve_identifier(path: &str, config: &Config) -> TemplateId {
    if config.relative_path {
        return TemplateId::Deferred;
    }

    match &config.replace_paths {
        Some(replace_paths) => TemplateId::Literal(apply_replace_paths(path, replace_paths)),
        None => TemplateId::Literal(path.to_string()),
    }
}

/// Rewrite `path` with the first declared search string it contains. The
/// match is a plain substring test: `/app` also matches `/apple`.
pub fn apply_replace_paths(path: &str, replace_paths: &IndexMap<String, String>) -> String {
    for (search, alias) in replace_paths {
        if let Some(pos) = path.find(search.as_str()) {
            let rest = &path[pos + search.len()..];
            return format!("{}{}", alias, rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        Config {
            replace_paths: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Config::default()
        }
    }

    #[test]
    fn test_plain_path_is_literal() {
        let id = resolve_identifier("/srv/app/views/index.twig", &Config::default());
        assert_eq!(id, TemplateId::Literal("/srv/app/views/index.twig".to_string()));
    }

    #[test]
    fn test_relative_path_defers() {
        let config = Config {
            relative_path: true,
            ..config_with(&[("/app", "@app")])
        };
        assert_eq!(resolve_identifier("/app/a.twig", &config), TemplateId::Deferred);
    }

    #[test]
    fn test_replace_paths_truncates_before_match() {
        let config = config_with(&[("/app", "@app"), ("/common", "@common")]);
        assert_eq!(
            resolve_identifier("/home/dev/project/common/layout.twig", &config),
            TemplateId::Literal("@common/layout.twig".to_string())
        );
    }

    #[test]
    fn test_first_declared_key_wins() {
        let config = config_with(&[("/app", "@app"), ("/ap", "@X")]);
        assert_eq!(
            resolve_identifier("/app/foo.twig", &config),
            TemplateId::Literal("@app/foo.twig".to_string())
        );

        let reversed = config_with(&[("/ap", "@X"), ("/app", "@app")]);
        assert_eq!(
            resolve_identifier("/app/foo.twig", &reversed),
            TemplateId::Literal("@Xp/foo.twig".to_string())
        );
    }

    #[test]
    fn test_match_is_not_segment_anchored() {
        let config = config_with(&[("/app", "@app")]);
        assert_eq!(
            resolve_identifier("/apple/x.twig", &config),
            TemplateId::Literal("@apple/x.twig".to_string())
        );
    }

    #[test]
    fn test_empty_key_prefixes_alias() {
        let config = config_with(&[("", "pkg:")]);
        assert_eq!(
            resolve_identifier("/a.twig", &config),
            TemplateId::Literal("pkg:/a.twig".to_string())
        );
    }

    #[test]
    fn test_no_match_leaves_path() {
        let config = config_with(&[("/lib", "@lib")]);
        assert_eq!(
            resolve_identifier("/app/x.twig", &config),
            TemplateId::Literal("/app/x.twig".to_string())
        );
        let empty = config_with(&[]);
        assert_eq!(
            resolve_identifier("/app/x.twig", &empty),
            TemplateId::Literal("/app/x.twig".to_string())
        );
    }
}
