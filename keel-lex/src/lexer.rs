#![forbid(unsafe_code)]

use keel_ast::{span_between, SourceFile, Span};
use keel_diagnostics::{codes, Diagnostics, Layer, LayerError};
use logos::Logos;

use crate::token::{Token, TokenKind};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
enum RawToken {
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,

    #[token("&&")]
    AndAnd,
    #[token("&")]
    Amp,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(Option<u64>),

    // Only `\"` is an escape; any other backslash pair is kept verbatim.
    #[regex(r#""([^"\\\n]|\\[^\n])*""#, parse_string)]
    String(String),

    // Longest match lets a terminated literal win over this prefix.
    #[regex(r#""([^"\\\n]|\\[^\n])*"#)]
    UnterminatedString,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> String {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1];
    inner.replace("\\\"", "\"")
}

pub struct Lexer<'a> {
    file: &'a SourceFile,
}

impl<'a> Lexer<'a> {
    pub fn new(file: &'a SourceFile) -> Self {
        Self { file }
    }

    /// Tokenize the whole file.
    ///
    /// Never fails: malformed input is reported to `diags` and skipped. The
    /// returned stream always ends with exactly one `Eof` token.
    pub fn lex(&self, diags: &mut Diagnostics) -> Vec<Token> {
        let src = self.file.content();
        let mut tokens = Vec::new();
        let mut base = 0usize;

        'restart: loop {
            let mut lex = RawToken::lexer(&src[base..]);
            while let Some(raw) = lex.next() {
                let range = lex.span();
                let start = base + range.start;
                let end = base + range.end;
                let span = span_between(start, end);

                let kind = match raw {
                    Ok(RawToken::LBrace) => TokenKind::LBrace,
                    Ok(RawToken::RBrace) => TokenKind::RBrace,
                    Ok(RawToken::LParen) => TokenKind::LParen,
                    Ok(RawToken::RParen) => TokenKind::RParen,
                    Ok(RawToken::Semi) => TokenKind::Semi,
                    Ok(RawToken::Comma) => TokenKind::Comma,
                    Ok(RawToken::Colon) => TokenKind::Colon,
                    Ok(RawToken::Dot) => TokenKind::Dot,

                    Ok(RawToken::EqEq) => TokenKind::EqEq,
                    Ok(RawToken::Ne) => TokenKind::Ne,
                    Ok(RawToken::Le) => TokenKind::Le,
                    Ok(RawToken::Ge) => TokenKind::Ge,
                    Ok(RawToken::Lt) => TokenKind::Lt,
                    Ok(RawToken::Gt) => TokenKind::Gt,
                    Ok(RawToken::Eq) => TokenKind::Eq,

                    Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                    Ok(RawToken::Amp) => TokenKind::Amp,
                    Ok(RawToken::Tilde) => TokenKind::Tilde,

                    Ok(RawToken::Plus) => TokenKind::Plus,
                    Ok(RawToken::Minus) => TokenKind::Minus,
                    Ok(RawToken::Star) => TokenKind::Star,
                    Ok(RawToken::Slash) => TokenKind::Slash,
                    Ok(RawToken::Percent) => TokenKind::Percent,

                    Ok(RawToken::Ident(word)) => {
                        TokenKind::keyword(&word).unwrap_or(TokenKind::Ident(word))
                    }
                    Ok(RawToken::Int(Some(n))) => TokenKind::Int(n),
                    Ok(RawToken::Int(None)) => {
                        diags.push(
                            LayerError::error(
                                Layer::Lexer,
                                codes::LEX_INT_TOO_LARGE,
                                format!("integer literal `{}` does not fit in 64 bits", lex.slice()),
                            )
                            .at(self.file, span),
                        );
                        // Keep the token so the parser does not cascade.
                        TokenKind::Int(0)
                    }
                    Ok(RawToken::String(s)) => TokenKind::Str(s),

                    Ok(RawToken::UnterminatedString) => {
                        let quote = span_between(start, start + 1);
                        diags.push(
                            LayerError::error(
                                Layer::Lexer,
                                codes::LEX_UNTERMINATED_STRING,
                                "unterminated string literal",
                            )
                            .at(self.file, quote)
                            .with_detail("string literals must close on the line they open"),
                        );
                        log::trace!("lexer restarting after unterminated string at {start}");
                        base = start + 1;
                        continue 'restart;
                    }
                    Ok(RawToken::Bang) => {
                        diags.push(
                            LayerError::error(Layer::Lexer, codes::LEX_LONE_BANG, "unexpected `!`")
                                .at(self.file, span)
                                .with_suggestion("did you mean `!=`"),
                        );
                        continue;
                    }
                    Err(()) => {
                        self.report_unexpected(diags, span);
                        continue;
                    }
                };

                tokens.push(self.token(kind, span));
            }
            break;
        }

        let eof = span_between(src.len(), src.len());
        tokens.push(self.token(TokenKind::Eof, eof));
        log::debug!("lexed {} tokens from {}", tokens.len(), self.file.path().display());
        tokens
    }

    fn token(&self, kind: TokenKind, span: Span) -> Token {
        let start = span.offset();
        let lexeme = self
            .file
            .content()
            .get(start..start + span.len())
            .unwrap_or_default()
            .to_string();
        Token {
            kind,
            lexeme,
            span,
            pos: self.file.position(start),
        }
    }

    fn report_unexpected(&self, diags: &mut Diagnostics, span: Span) {
        let start = span.offset();
        let text = self
            .file
            .content()
            .get(start..start + span.len())
            .unwrap_or_default();
        let mut err = LayerError::error(
            Layer::Lexer,
            codes::LEX_UNEXPECTED_CHAR,
            format!("unexpected character `{}`", text.escape_debug()),
        )
        .at(self.file, span);
        if !text.is_ascii() {
            err = err.with_detail("only ASCII characters are allowed outside string literals");
        }
        diags.push(err);
    }
}
