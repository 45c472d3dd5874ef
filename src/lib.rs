//! # Twigify
//!
//! Bundler transform that precompiles Twig templates at build time.
//!
//! Files whose extension is in the active list are buffered in full, optionally
//! minified, tokenized into a Twig token tree, and replaced by a single CommonJS
//! module:
//!
//! ```text
//! module.exports = Twig.twig({ id: "<id>", data:<tree>, precompiled: true, allowInlineIncludes: true });
//! ```
//!
//! Every other file passes through unchanged.
//!
//! ## Shared configuration
//!
//! Options merge into one [`ConfigContext`] each time a template file starts,
//! and are read back when that file finishes. Keys a caller leaves out keep
//! their previous value. Two transforms with different options interleaving
//! over the same context see whichever options were merged last.

#[cfg(feature = "napi")]
mod binding;

mod compile;
mod config;
mod error;
mod extensions;
mod minify;
mod resolve;
mod tokenize;
mod transform;

#[cfg(test)]
mod transform_tests;

#[cfg(feature = "napi")]
pub use binding::{compile_template, TwigifyTransform};

pub use compile::{wrap_module, TemplateCompiler, RUNTIME_FACTORY};
pub use config::{
    Config, ConfigContext, MinifyOptions, MinifySetting, TransformOptions, DEFAULT_EXTENSIONS,
};
pub use error::*;
pub use extensions::{extension_of, is_eligible, resolve_extensions, ExtensionsOption};
pub use minify::{HtmlMinifier, Minifier};
pub use resolve::{apply_replace_paths, resolve_identifier, TemplateId};
pub use tokenize::{
    compile_expression, Associativity, ExprToken, LogicToken, Operator, Token, TokenTree,
    Tokenizer, TwigTokenizer,
};
pub use transform::{transform_file, FileTransform, Twigify};
