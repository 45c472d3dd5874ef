//! Transform Module for Twigify
//!
//! Per-file stream state machine. An eligible file is buffered until the host
//! signals end of input, then compiled and emitted as a single module chunk.
//! Any other file is forwarded chunk by chunk, unchanged.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::compile::{wrap_module, TemplateCompiler};
use crate::config::{ConfigContext, TransformOptions};
use crate::error::TransformError;
use crate::extensions::{is_eligible, resolve_extensions};
use crate::minify::{HtmlMinifier, Minifier};
use crate::resolve::resolve_identifier;
use crate::tokenize::{Tokenizer, TwigTokenizer};

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// A transform bound to one set of options.
///
/// Every [`FileTransform`] it creates merges those options into the shared
/// [`ConfigContext`]; see that type for the last-write-wins contract.
#[derive(Debug, Clone)]
pub struct Twigify<T = TwigTokenizer, M = HtmlMinifier> {
    context: ConfigContext,
    options: TransformOptions,
    compiler: Arc<TemplateCompiler<T, M>>,
}

impl Twigify {
    /// Bind `options` against the process-wide configuration.
    pub fn new(options: TransformOptions) -> Self {
        Twigify::with_context(ConfigContext::global(), options, TemplateCompiler::default())
    }

    pub fn from_value(options: &Value) -> Self {
        Twigify::new(TransformOptions::from_value(options))
    }
}

impl<T: Tokenizer, M: Minifier> Twigify<T, M> {
    pub fn with_context(
        context: ConfigContext,
        options: TransformOptions,
        compiler: TemplateCompiler<T, M>,
    ) -> Self {
        Twigify {
            context,
            options,
            compiler: Arc::new(compiler),
        }
    }

    pub fn context(&self) -> &ConfigContext {
        &self.context
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Start transforming one file.
    pub fn transform(&self, file: impl Into<String>) -> FileTransform<T, M> {
        let file = file.into();
        let extensions = resolve_extensions(
            self.options.extensions.as_ref(),
            &self.context.default_extensions(),
        );

        let state = if is_eligible(&file, &extensions) {
            self.context.merge(&self.options);
            State::Buffering(Vec::new())
        } else {
            debug!(file = %file, "passing through file without a template extension");
            State::PassThrough
        };

        FileTransform {
            file,
            state,
            context: self.context.clone(),
            compiler: Arc::clone(&self.compiler),
        }
    }
}

/// Transform a single file against the process-wide configuration.
pub fn transform_file(file: impl Into<String>, options: TransformOptions) -> FileTransform {
    Twigify::new(options).transform(file)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-FILE STREAM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
enum State {
    PassThrough,
    Buffering(Vec<u8>),
    Finished,
}

#[derive(Debug)]
pub struct FileTransform<T = TwigTokenizer, M = HtmlMinifier> {
    file: String,
    state: State,
    context: ConfigContext,
    compiler: Arc<TemplateCompiler<T, M>>,
}

impl<T: Tokenizer, M: Minifier> FileTransform<T, M> {
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self.state, State::PassThrough)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Accept the next chunk of input. Pass-through files hand the chunk
    /// straight back for forwarding; template files buffer it.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, TransformError> {
        match &mut self.state {
            State::PassThrough => Ok(Some(chunk.to_vec())),
            State::Buffering(buffer) => {
                buffer.extend_from_slice(chunk);
                Ok(None)
            }
            State::Finished => Err(TransformError::Finished(self.file.clone())),
        }
    }

    /// Signal end of input. Returns the single rewritten module chunk for a
    /// template file, or `None` for a pass-through file.
    pub fn finish(&mut self) -> Result<Option<Vec<u8>>, TransformError> {
        match std::mem::replace(&mut self.state, State::Finished) {
            State::PassThrough => Ok(None),
            State::Finished => Err(TransformError::Finished(self.file.clone())),
            State::Buffering(buffer) => {
                let source = String::from_utf8_lossy(&buffer);
                let config = self.context.snapshot();
                let id = resolve_identifier(&self.file, &config);
                debug!(file = %self.file, bytes = buffer.len(), ?id, "compiling template");

                let fragment = self.compiler.compile(&self.file, &id, &source, &config)?;
                let module = wrap_module(&fragment);
                debug!(file = %self.file, bytes = module.len(), "compiled template");
                Ok(Some(module.into_bytes()))
            }
        }
    }

    /// Drop any buffered input without compiling.
    pub fn abort(mut self) {
        if let State::Buffering(buffer) = std::mem::replace(&mut self.state, State::Finished) {
            debug!(file = %self.file, bytes = buffer.len(), "aborted before end of input");
        }
    }

    /// Drive the whole stream: every chunk, then end of input. Returns the
    /// chunks the host would receive, in order.
    pub fn run<I, C>(mut self, chunks: I) -> Result<Vec<Vec<u8>>, TransformError>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut output = Vec::new();
        for chunk in chunks {
            if let Some(forwarded) = self.write(chunk.as_ref())? {
                output.push(forwarded);
            }
        }
        if let Some(module) = self.finish()? {
            output.push(module);
        }
        Ok(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinifySetting;

    fn isolated(options: TransformOptions) -> Twigify {
        Twigify::with_context(ConfigContext::new(), options, TemplateCompiler::default())
    }

    #[test]
    fn test_buffers_until_finish() {
        let twigify = isolated(TransformOptions::new().with_minify(MinifySetting::Disabled));
        let mut stream = twigify.transform("/views/a.twig");
        assert!(!stream.is_pass_through());
        assert_eq!(stream.write(b"Hello ").unwrap(), None);
        assert_eq!(stream.write(b"{{ name }}").unwrap(), None);

        let module = String::from_utf8(stream.finish().unwrap().unwrap()).unwrap();
        assert!(module.starts_with("\nmodule.exports = Twig.twig({ id: \"/views/a.twig\", data:"));
        assert!(module.contains(r#"{"type":"raw","value":"Hello "}"#));
        assert!(module.ends_with(", precompiled: true, allowInlineIncludes: true });"));
        assert!(stream.is_finished());
    }

    #[test]
    fn test_pass_through_forwards_each_chunk() {
        let twigify = isolated(TransformOptions::new());
        let mut stream = twigify.transform("styles.css");
        assert!(stream.is_pass_through());
        assert_eq!(stream.write(b"a{}").unwrap(), Some(b"a{}".to_vec()));
        assert_eq!(stream.finish().unwrap(), None);
    }

    #[test]
    fn test_write_after_finish_is_rejected() {
        let twigify = isolated(TransformOptions::new());
        let mut stream = twigify.transform("/a.twig");
        stream.finish().unwrap();
        assert!(matches!(stream.write(b"x"), Err(TransformError::Finished(_))));
        assert!(matches!(stream.finish(), Err(TransformError::Finished(_))));
    }

    #[test]
    fn test_ineligible_file_does_not_merge_options() {
        let twigify = isolated(TransformOptions::new().with_relative_path(true));
        let _ = twigify.transform("main.js");
        assert!(!twigify.context().snapshot().relative_path);
        let _ = twigify.transform("main.twig");
        assert!(twigify.context().snapshot().relative_path);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let twigify = isolated(TransformOptions::new().with_minify(MinifySetting::Disabled));
        let out = twigify
            .transform("/a.html")
            .run([&b"caf"[..], &[0xff][..], &b"e"[..]])
            .unwrap();
        let module = String::from_utf8(out[0].clone()).unwrap();
        assert!(module.contains("caf\u{fffd}e"));
    }
}
