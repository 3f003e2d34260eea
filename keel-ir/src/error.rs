#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use keel_ast::{SourceFile, Span};
use keel_diagnostics::{ErrorCode, Layer, LayerError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("emitter error: {message}")]
#[diagnostic(code(keel::emit))]
#[allow(unused_assignments)]
pub struct EmitError {
    pub code: ErrorCode,
    pub message: String,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
}

impl EmitError {
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn into_layer_error(self, file: &SourceFile) -> LayerError {
        let mut err = LayerError::error(Layer::Emitter, self.code, self.message).at(file, self.span);
        if let Some(help) = self.help {
            err = err.with_suggestion(help);
        }
        err
    }
}
