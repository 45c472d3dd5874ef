//! Minify Module for Twigify
//!
//! Markup minification applied to template source before tokenization. The
//! rewriting is done by `minify-html` with brace template syntax preserved, so
//! `{{ }}`, `{% %}` and `{# #}` reach the tokenizer untouched. A strictness
//! pass runs first: `minify-html` repairs broken markup silently, and a
//! template with an unterminated comment or tag must fail the build instead.

use minify_html::Cfg;
use tracing::debug;

use crate::config::MinifyOptions;
use crate::error::MinifyError;

/// Text-to-text markup minifier.
pub trait Minifier {
    fn minify(&self, source: &str, options: &MinifyOptions) -> Result<String, MinifyError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRICTNESS CHECK
// ═══════════════════════════════════════════════════════════════════════════════

const TEMPLATE_DELIMITERS: [(&str, &str); 3] = [("{{", "}}"), ("{%", "%}"), ("{#", "#}")];

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

fn template_close(rest: &str) -> Option<&'static str> {
    TEMPLATE_DELIMITERS
        .iter()
        .find(|(open, _)| rest.starts_with(open))
        .map(|(_, close)| *close)
}

/// Length of a template construct at the start of `rest`. An unterminated one
/// is left for the tokenizer to report.
fn template_len(rest: &str) -> Option<usize> {
    let close = template_close(rest)?;
    Some(rest[2..].find(close).map_or(2, |end| end + 2 + close.len()))
}

fn opens_tag(rest: &str) -> bool {
    let name = rest.strip_prefix("</").or_else(|| rest.strip_prefix('<'));
    name.is_some_and(|name| name.starts_with(|c: char| c.is_ascii_alphabetic()))
}

/// Reject markup that would otherwise be repaired: unterminated comments,
/// tags or quoted attribute values, and unclosed `<script>`/`<style>`.
fn check_markup(source: &str) -> Result<(), MinifyError> {
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];

        if rest.starts_with("<!--") {
            let end = rest
                .find("-->")
                .ok_or_else(|| MinifyError::new("Unterminated comment", pos))?;
            pos += end + 3;
        } else if let Some(len) = template_len(rest) {
            pos += len;
        } else if opens_tag(rest) {
            let (name, end) = check_tag(source, pos)?;
            pos = end;
            if RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !rest.starts_with("</") {
                let needle = format!("</{}", name);
                let close = source[pos..]
                    .to_ascii_lowercase()
                    .find(&needle)
                    .ok_or_else(|| {
                        MinifyError::new(format!("Unclosed <{}> element", name), pos)
                    })?;
                pos += close;
            }
        } else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    Ok(())
}

/// Scan the tag opening at `start`. Returns its lower-cased name and the
/// index just past `>`.
fn check_tag(source: &str, start: usize) -> Result<(String, usize), MinifyError> {
    let rest = &source[start..];
    let name_start = if rest.starts_with("</") { 2 } else { 1 };
    let name_len = rest[name_start..]
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_' | '.')))
        .unwrap_or(rest.len() - name_start);
    let name = rest[name_start..name_start + name_len].to_ascii_lowercase();

    let mut i = name_start + name_len;
    let mut after_eq = false;
    while i < rest.len() {
        let tail = &rest[i..];
        if let Some(len) = template_len(tail) {
            i += len;
            after_eq = false;
            continue;
        }
        let c = tail.chars().next().unwrap_or(' ');
        match c {
            '>' => return Ok((name, start + i + 1)),
            '=' => after_eq = true,
            '"' | '\'' if after_eq => {
                let end = tail[1..].find(c).ok_or_else(|| {
                    MinifyError::new("Unterminated attribute value", start + i)
                })?;
                i += end + 2;
                after_eq = false;
                continue;
            }
            c if c.is_whitespace() => {}
            _ => after_eq = false,
        }
        i += c.len_utf8();
    }

    Err(MinifyError::new(format!("Unclosed tag <{}>", name), start))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT MINIFIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Options `minify-html` has a switch for. Whitespace is always collapsed and
/// attribute quotes minimized once it runs.
fn cfg_for(options: &MinifyOptions) -> Cfg {
    let mut cfg = Cfg::new();
    cfg.preserve_brace_template_syntax = true;
    cfg.keep_comments = !options.remove_comments;
    cfg.keep_closing_tags = !options.remove_optional_tags;
    cfg.keep_html_and_head_opening_tags = !options.remove_optional_tags;
    cfg.preserve_chevron_percent_template_syntax = !options.remove_ignored;
    cfg.remove_processing_instructions = options.remove_ignored;
    cfg.keep_spaces_between_attributes = false;
    cfg.do_not_minify_doctype = true;
    cfg.ensure_spec_compliant_unquoted_attribute_values = !options.remove_attribute_quotes;
    cfg.minify_css = false;
    cfg.minify_js = false;
    cfg
}

fn rewrites(options: &MinifyOptions) -> bool {
    options.collapse_whitespace
        || options.remove_comments
        || options.remove_optional_tags
        || options.remove_attribute_quotes
        || options.remove_ignored
}

/// Minifier for HTML-flavoured templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMinifier;

impl Minifier for HtmlMinifier {
    fn minify(&self, source: &str, options: &MinifyOptions) -> Result<String, MinifyError> {
        check_markup(source)?;
        if !rewrites(options) {
            return Ok(source.to_string());
        }

        let minified = minify_html::minify(source.as_bytes(), &cfg_for(options));
        let out = String::from_utf8(minified)
            .map_err(|e| MinifyError::new(format!("Minified markup is not UTF-8: {}", e), 0))?;
        debug!(before = source.len(), after = out.len(), "minified markup");
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn minify(source: &str, options: MinifyOptions) -> String {
        HtmlMinifier.minify(source, &options).unwrap()
    }

    #[test]
    fn test_template_constructs_survive() {
        let source = "<div class=\"{{ cls }}\">\n  {% if a %}\n    <b>{{ a }}</b>\n  {% endif %}\n  {# note #}\n</div>";
        let out = minify(source, MinifyOptions::recommended());
        for construct in ["{{ cls }}", "{% if a %}", "{{ a }}", "{% endif %}", "{# note #}"] {
            assert!(out.contains(construct), "{:?} lost from {:?}", construct, out);
        }
        assert!(out.len() < source.len());
    }

    #[test]
    fn test_comments_follow_option() {
        let source = "<div><!-- note --><span>x</span></div>";
        assert!(!minify(source, MinifyOptions::recommended()).contains("note"));

        let keep = MinifyOptions {
            collapse_whitespace: true,
            ..MinifyOptions::default()
        };
        assert!(minify(source, keep).contains("<!-- note -->"));
    }

    #[test]
    fn test_whitespace_collapsed() {
        let out = minify("<p>\n   hello  \n</p>", MinifyOptions::recommended());
        assert!(out.contains("hello"));
        assert!(!out.contains('\n'));
        assert!(!out.contains("  "));
    }

    #[test]
    fn test_no_rewriting_options_leave_text() {
        let source = "<p>\n  a  <!-- c -->\n</p>";
        assert_eq!(minify(source, MinifyOptions::default()), source);
    }

    #[test]
    fn test_cfg_mapping() {
        let recommended = cfg_for(&MinifyOptions::recommended());
        assert!(recommended.preserve_brace_template_syntax);
        assert!(!recommended.keep_comments);
        assert!(recommended.keep_closing_tags);
        assert!(recommended.preserve_chevron_percent_template_syntax);
        assert!(!recommended.minify_js);

        let aggressive = cfg_for(&MinifyOptions {
            remove_optional_tags: true,
            remove_ignored: true,
            ..MinifyOptions::default()
        });
        assert!(!aggressive.keep_closing_tags);
        assert!(!aggressive.keep_html_and_head_opening_tags);
        assert!(!aggressive.preserve_chevron_percent_template_syntax);
        assert!(aggressive.keep_comments);
    }

    #[test]
    fn test_literal_less_than_is_text() {
        assert!(check_markup("<p>a < b</p>").is_ok());
        assert!(check_markup("<p>{{ a < b }}</p>").is_ok());
    }

    #[test]
    fn test_template_inside_tag_does_not_end_it() {
        assert!(check_markup("<a {% if x > 1 %}href=\"y\"{% endif %}>z</a>").is_ok());
        assert!(check_markup("<img alt=\"{{ it's }}\" src={{ src }}>").is_ok());
    }

    #[test]
    fn test_malformed_markup_errors() {
        let options = MinifyOptions::recommended();
        assert!(HtmlMinifier.minify("<div><!-- open", &options).is_err());
        assert!(HtmlMinifier.minify("<div class=\"x", &options).is_err());
        assert!(HtmlMinifier.minify("<div class=x", &options).is_err());
        assert!(HtmlMinifier.minify("<script>var x;", &options).is_err());
        let err = HtmlMinifier.minify("ok <span", &options).unwrap_err();
        assert_eq!(err.offset, 3);
        assert!(err.message.contains("Unclosed tag <span>"));
    }

    #[test]
    fn test_malformed_markup_errors_without_rewriting() {
        let err = HtmlMinifier
            .minify("<div><!-- open", &MinifyOptions::default())
            .unwrap_err();
        assert_eq!(err.offset, 5);
    }
}
