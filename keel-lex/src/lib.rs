#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};

use keel_ast::SourceFile;
use keel_diagnostics::Diagnostics;

/// Convenience wrapper around [`Lexer::lex`].
pub fn lex(file: &SourceFile, diags: &mut Diagnostics) -> Vec<Token> {
    Lexer::new(file).lex(diags)
}
