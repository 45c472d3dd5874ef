//! Template compilation and module emission.
//!
//! Produces the constructor call the runtime evaluates to rebuild a
//! precompiled template, and wraps it as a CommonJS module body.

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{CompileError, TokenizeError};
use crate::minify::{HtmlMinifier, Minifier};
use crate::resolve::TemplateId;
use crate::tokenize::{Tokenizer, TwigTokenizer};

/// Runtime function the emitted module calls.
pub const RUNTIME_FACTORY: &str = "Twig.twig";

#[derive(Debug, Clone, Default)]
pub struct TemplateCompiler<T = TwigTokenizer, M = HtmlMinifier> {
    tokenizer: T,
    minifier: M,
}

impl<T: Tokenizer, M: Minifier> TemplateCompiler<T, M> {
    pub fn new(tokenizer: T, minifier: M) -> Self {
        TemplateCompiler {
            tokenizer,
            minifier,
        }
    }

    /// Compile one template into a constructor-call fragment.
    ///
    /// `file` is the template's own path; it names the template for the
    /// tokenizer and in errors. `id` is what the runtime registers it under.
    pub fn compile(
        &self,
        file: &str,
        id: &TemplateId,
        source: &str,
        config: &Config,
    ) -> Result<String, CompileError> {
        let minified;
        let text = match config.minify.options() {
            Some(options) => {
                minified = self.minifier.minify(source, options).map_err(|source| {
                    CompileError::Minify {
                        file: file.to_string(),
                        source,
                    }
                })?;
                debug!(file, before = source.len(), after = minified.len(), "minified template");
                minified.as_str()
            }
            None => source,
        };

        let tree = self
            .tokenizer
            .tokenize(file, text)
            .map_err(|source| CompileError::Tokenize {
                file: file.to_string(),
                source,
            })?;

        let data = serde_json::to_string(&tree).map_err(|e| CompileError::Tokenize {
            file: file.to_string(),
            source: TokenizeError::new(format!("token tree is not serializable: {}", e), 0),
        })?;

        Ok(constructor_call(id, &data))
    }
}

fn constructor_call(id: &TemplateId, data: &str) -> String {
    match id {
        TemplateId::Deferred => format!(
            "{}({{ id: __filename, path: __dirname, data:{}, precompiled: true, allowInlineIncludes: true }})",
            RUNTIME_FACTORY, data
        ),
        TemplateId::Literal(id) => format!(
            "{}({{ id: {}, data:{}, precompiled: true, allowInlineIncludes: true }})",
            RUNTIME_FACTORY,
            Value::String(id.clone()),
            data
        ),
    }
}

/// Wrap a compiled fragment as the replacement module body.
pub fn wrap_module(fragment: &str) -> String {
    format!("\nmodule.exports = {};", fragment)
}
