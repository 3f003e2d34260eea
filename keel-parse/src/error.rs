#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use keel_ast::{SourceFile, Span};
use keel_diagnostics::{codes, ErrorCode, Layer, LayerError, Severity};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(keel::parse))]
#[allow(unused_assignments)]
pub struct ParseError {
    pub code: ErrorCode,
    pub message: String,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
}

impl ParseError {
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

    /// Nesting overflow stops the parser outright; everything else is recoverable.
    pub fn is_fatal(&self) -> bool {
        self.code == codes::PARSE_TOO_DEEP
    }

    pub fn into_layer_error(self, file: &SourceFile) -> LayerError {
        let severity = if self.is_fatal() {
            Severity::Fatal
        } else {
            Severity::Error
        };
        let mut err = LayerError::new(Layer::Parser, severity, self.code, self.message).at(file, self.span);
        if let Some(help) = self.help {
            err = err.with_suggestion(help);
        }
        err
    }
}
