#![forbid(unsafe_code)]

use keel_ast::{SourcePosition, Span};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text of the token; empty for end-of-stream.
    pub lexeme: String,
    pub span: Span,
    pub pos: SourcePosition,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwFn,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwIn,
    KwTrue,
    KwFalse,
    KwRange,
    KwAuto,
    KwInt,
    KwBool,
    KwVoid,
    KwClass,
    KwDefault,
    KwExplicit,
    KwConst,
    KwOperator,
    KwReturn,
    KwDefer,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Comma,
    Colon,
    Dot,

    // Operators
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    Amp,
    AndAnd,
    Tilde,

    Eof,

    // Literals / identifiers
    Ident(String),
    Int(u64),
    Str(String),
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "fn" => TokenKind::KwFn,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "for" => TokenKind::KwFor,
            "in" => TokenKind::KwIn,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            "range" => TokenKind::KwRange,
            "auto" => TokenKind::KwAuto,
            "int" => TokenKind::KwInt,
            "bool" => TokenKind::KwBool,
            "void" => TokenKind::KwVoid,
            "class" => TokenKind::KwClass,
            "default" => TokenKind::KwDefault,
            "explicit" => TokenKind::KwExplicit,
            "const" => TokenKind::KwConst,
            "operator" => TokenKind::KwOperator,
            "return" => TokenKind::KwReturn,
            "defer" => TokenKind::KwDefer,
            _ => return None,
        })
    }

    /// Human-readable name used in "expected ..." diagnostics.
    pub fn describe(&self) -> String {
        let fixed = match self {
            TokenKind::KwFn => "fn",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwWhile => "while",
            TokenKind::KwFor => "for",
            TokenKind::KwIn => "in",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwRange => "range",
            TokenKind::KwAuto => "auto",
            TokenKind::KwInt => "int",
            TokenKind::KwBool => "bool",
            TokenKind::KwVoid => "void",
            TokenKind::KwClass => "class",
            TokenKind::KwDefault => "default",
            TokenKind::KwExplicit => "explicit",
            TokenKind::KwConst => "const",
            TokenKind::KwOperator => "operator",
            TokenKind::KwReturn => "return",
            TokenKind::KwDefer => "defer",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Semi => ";",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Eq => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Amp => "&",
            TokenKind::AndAnd => "&&",
            TokenKind::Tilde => "~",
            TokenKind::Eof => return "end of input".to_string(),
            TokenKind::Ident(_) => return "identifier".to_string(),
            TokenKind::Int(_) => return "number".to_string(),
            TokenKind::Str(_) => return "string literal".to_string(),
        };
        format!("`{fixed}`")
    }
}
