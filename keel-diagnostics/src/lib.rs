#![forbid(unsafe_code)]

pub mod codes;
mod render;

use std::fmt;

use keel_ast::{FileTable, NodeId, SourceFile, SourcePosition, Span};
use miette::{Diagnostic, LabeledSpan};
use thiserror::Error;

pub use render::render_plain;

/// The pipeline stage that recorded a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Loader,
    Lexer,
    Parser,
    Semantic,
    Raii,
    Emitter,
}

impl Layer {
    pub fn name(self) -> &'static str {
        match self {
            Layer::Loader => "loader",
            Layer::Lexer => "lexer",
            Layer::Parser => "parser",
            Layer::Semantic => "semantic",
            Layer::Raii => "raii",
            Layer::Emitter => "emitter",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn display(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    /// Error and Fatal suppress dependent passes and force a failing exit.
    pub fn is_blocking(self) -> bool {
        self >= Severity::Error
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ErrorCode(pub u16);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// A token (or synthesized span) a diagnostic points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRef {
    pub span: Span,
    pub position: SourcePosition,
    pub lexeme: String,
}

impl TokenRef {
    pub fn new(file: &SourceFile, span: Span) -> Self {
        let start = span.offset();
        let end = (start + span.len()).min(file.content().len());
        let lexeme = file.content().get(start..end).unwrap_or_default().to_string();
        Self {
            span,
            position: file.position(start),
            lexeme,
        }
    }
}

/// The lexical scope a diagnostic is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeRef {
    pub block: NodeId,
    pub span: Span,
    pub label: String,
}

#[derive(Clone, Debug, Error)]
#[error("[{code}] {message}")]
pub struct LayerError {
    pub layer: Layer,
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub tokens: Vec<TokenRef>,
    pub scope: Option<ScopeRef>,
    pub detail: Option<String>,
    pub suggestions: Vec<String>,
}

impl LayerError {
    pub fn new(layer: Layer, severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            layer,
            severity,
            code,
            message: message.into(),
            tokens: Vec::new(),
            scope: None,
            detail: None,
            suggestions: Vec::new(),
        }
    }

    pub fn error(layer: Layer, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(layer, Severity::Error, code, message)
    }

    pub fn warning(layer: Layer, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(layer, Severity::Warning, code, message)
    }

    pub fn fatal(layer: Layer, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(layer, Severity::Fatal, code, message)
    }

    /// Point at `span` inside `file`.
    pub fn at(mut self, file: &SourceFile, span: Span) -> Self {
        self.tokens.push(TokenRef::new(file, span));
        self
    }

    pub fn with_scope(mut self, scope: ScopeRef) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    pub fn primary_position(&self) -> Option<SourcePosition> {
        self.tokens.first().map(|t| t.position)
    }
}

impl Diagnostic for LayerError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("keel::{}::{}", self.layer.name(), self.code)))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Info => miette::Severity::Advice,
            Severity::Warning => miette::Severity::Warning,
            Severity::Error | Severity::Fatal => miette::Severity::Error,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if self.suggestions.is_empty() {
            None
        } else {
            Some(Box::new(self.suggestions.join("; ")))
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.tokens.is_empty() && self.scope.is_none() {
            return None;
        }
        let tokens = self
            .tokens
            .iter()
            .map(|t| LabeledSpan::new_with_span(None, t.span));
        let scope = self
            .scope
            .iter()
            .map(|s| LabeledSpan::new_with_span(Some(s.label.clone()), s.span));
        Some(Box::new(tokens.chain(scope)))
    }
}

/// The diagnostic sink shared by every pass of one compilation.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    errors: Vec<LayerError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: LayerError) {
        self.errors.push(err);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_blocking(&self) -> bool {
        self.errors.iter().any(LayerError::is_blocking)
    }

    pub fn has_fatal_from(&self, layer: Layer) -> bool {
        self.errors
            .iter()
            .any(|e| e.layer == layer && e.severity == Severity::Fatal)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.errors.iter().filter(|e| e.severity == severity).count()
    }

    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &LayerError> {
        self.errors.iter().filter(move |e| e.code == code)
    }

    /// Promote every warning to an error (`deny-warnings`).
    pub fn escalate_warnings(&mut self) {
        for e in &mut self.errors {
            if e.severity == Severity::Warning {
                e.severity = Severity::Error;
            }
        }
    }

    pub fn render_plain(&self, files: &FileTable, context_lines: usize) -> String {
        render::render_plain(self, files, context_lines)
    }

    /// Flush order: `(file, line, column, layer)`; position-less entries first.
    pub fn sorted(&self) -> Vec<&LayerError> {
        let mut out: Vec<&LayerError> = self.errors.iter().collect();
        out.sort_by_key(|e| {
            let pos = e.primary_position();
            (
                pos.map(|p| (p.file, p.line, p.column)),
                e.layer,
            )
        });
        out
    }
}

impl Extend<LayerError> for Diagnostics {
    fn extend<T: IntoIterator<Item = LayerError>>(&mut self, iter: T) {
        self.errors.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_ast::{span, FileId};

    fn src() -> SourceFile {
        SourceFile::new(FileId(0), "t.kl", "fn main() {\n  x = 1;\n}\n")
    }

    #[test]
    fn severity_ordering_marks_blocking() {
        assert!(!Severity::Info.is_blocking());
        assert!(!Severity::Warning.is_blocking());
        assert!(Severity::Error.is_blocking());
        assert!(Severity::Fatal.is_blocking());
    }

    #[test]
    fn codes_render_as_four_digits() {
        assert_eq!(codes::RAII_PRECONDITION.to_string(), "5000");
        assert_eq!(ErrorCode(42).to_string(), "0042");
    }

    #[test]
    fn token_ref_captures_lexeme_and_position() {
        let f = src();
        let t = TokenRef::new(&f, span(14, 1));
        assert_eq!(t.lexeme, "x");
        assert_eq!((t.position.line, t.position.column), (2, 3));
    }

    #[test]
    fn sorted_orders_by_position_then_layer() {
        let f = src();
        let mut sink = Diagnostics::new();
        sink.push(LayerError::error(Layer::Semantic, codes::SEMA_UNDECLARED, "late").at(&f, span(14, 1)));
        sink.push(LayerError::error(Layer::Parser, codes::PARSE_EXPECTED_TOKEN, "same spot").at(&f, span(14, 1)));
        sink.push(LayerError::error(Layer::Lexer, codes::LEX_UNEXPECTED_CHAR, "early").at(&f, span(0, 2)));
        let order: Vec<&str> = sink.sorted().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(order, vec!["early", "same spot", "late"]);
    }

    #[test]
    fn escalation_makes_warnings_blocking() {
        let mut sink = Diagnostics::new();
        sink.push(LayerError::warning(Layer::Semantic, codes::SEMA_UNUSED_LOCAL, "unused"));
        assert!(!sink.has_blocking());
        sink.escalate_warnings();
        assert!(sink.has_blocking());
    }

    #[test]
    fn miette_bridge_exposes_code_and_help() {
        let f = src();
        let err = LayerError::error(Layer::Lexer, codes::LEX_LONE_BANG, "unexpected `!`")
            .at(&f, span(0, 1))
            .with_suggestion("did you mean `!=`");
        let code = Diagnostic::code(&err).map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("keel::lexer::2002"));
        let help = Diagnostic::help(&err).map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("did you mean `!=`"));
        assert_eq!(err.to_string(), "[2002] unexpected `!`");
    }
}
