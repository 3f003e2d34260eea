#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use keel_ast::{SourceFile, Span};
use keel_diagnostics::{ErrorCode, Layer, LayerError, Severity};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("semantic error: {message}")]
#[diagnostic(code(keel::sema))]
#[allow(unused_assignments)]
pub struct SemanticError {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
}

impl SemanticError {
    pub fn error(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message, span)
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn into_layer_error(self, file: &SourceFile) -> LayerError {
        let mut err = LayerError::new(Layer::Semantic, self.severity, self.code, self.message)
            .at(file, self.span);
        if let Some(help) = self.help {
            err = err.with_suggestion(help);
        }
        err
    }
}
