//! Error types for the transform pipeline.
//!
//! Only the template compiler can fail. Extension matching, identifier
//! resolution and module wrapping are total.

use thiserror::Error;

pub const MINIFY_ERROR: &str = "MINIFY_ERROR";
pub const TOKENIZE_ERROR: &str = "TOKENIZE_ERROR";

/// Markup rejected by a [`crate::minify::Minifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {offset})")]
pub struct MinifyError {
    pub message: String,
    pub offset: usize,
}

impl MinifyError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Template syntax a [`crate::tokenize::Tokenizer`] cannot parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {offset})")]
pub struct TokenizeError {
    pub message: String,
    pub offset: usize,
}

impl TokenizeError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Unrecoverable failure compiling one template file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("failed to minify {file}: {source}")]
    Minify {
        file: String,
        #[source]
        source: MinifyError,
    },
    #[error("failed to tokenize {file}: {source}")]
    Tokenize {
        file: String,
        #[source]
        source: TokenizeError,
    },
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Minify { .. } => MINIFY_ERROR,
            CompileError::Tokenize { .. } => TOKENIZE_ERROR,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            CompileError::Minify { file, .. } | CompileError::Tokenize { file, .. } => file,
        }
    }
}

/// Error surfaced by a per-file transform stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("transform for {0} has already finished")]
    Finished(String),
}
