//! Node bindings.
//!
//! A bundler plugin drives one `TwigifyTransform` per file: `write` for every
//! chunk, then `end`. Whatever either returns is pushed downstream.

use napi::bindgen_prelude::Buffer;
use napi_derive::napi;
use serde_json::Value;

use crate::config::TransformOptions;
use crate::transform::{FileTransform, Twigify};

fn options_from(options: Option<Value>) -> TransformOptions {
    TransformOptions::from_value(&options.unwrap_or(Value::Null))
}

#[napi]
pub struct TwigifyTransform {
    inner: FileTransform,
}

#[napi]
impl TwigifyTransform {
    #[napi(constructor)]
    pub fn new(file: String, options: Option<Value>) -> Self {
        TwigifyTransform {
            inner: Twigify::new(options_from(options)).transform(file),
        }
    }

    #[napi]
    pub fn write(&mut self, chunk: Buffer) -> napi::Result<Option<Buffer>> {
        let forwarded = self
            .inner
            .write(&chunk)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?;
        Ok(forwarded.map(Buffer::from))
    }

    #[napi]
    pub fn end(&mut self) -> napi::Result<Option<Buffer>> {
        let module = self
            .inner
            .finish()
            .map_err(|e| napi::Error::from_reason(e.to_string()))?;
        Ok(module.map(Buffer::from))
    }

    #[napi(getter)]
    pub fn is_pass_through(&self) -> bool {
        self.inner.is_pass_through()
    }
}

/// Transform a whole file in one call. Ineligible files come back unchanged.
#[napi]
pub fn compile_template(
    file: String,
    source: String,
    options: Option<Value>,
) -> napi::Result<String> {
    let chunks = Twigify::new(options_from(options))
        .transform(file)
        .run([source])
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(String::from_utf8_lossy(&chunks.concat()).into_owned())
}
