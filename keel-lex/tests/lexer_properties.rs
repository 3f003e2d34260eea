use keel_ast::{FileId, SourceFile};
use keel_diagnostics::Diagnostics;
use keel_lex::{lex, TokenKind};
use proptest::{
    prelude::{any, prop},
    test_runner::{Config, TestCaseError, TestRunner},
};

const PIECES: &[&str] = &[
    "fn", "main", "(", ")", "{", "}", ";", ",", ".", "int", "bool", "auto", "x", "y_2", "_tmp",
    "0", "42", "\"s\"", "\"a \\\" b\"", "<", "<=", ">", ">=", "==", "!=", "=", "+", "-", "*", "/",
    "%", "&", "&&", "~", "defer", "return", "range", "if", "else", "while", "for", "in", "true",
    "class",
];

const SEPARATORS: &[&str] = &[" ", "\n", "\t", "  ", " // note\n", "\r\n", "\n// c\n\n"];

fn build(parts: &[(usize, usize)]) -> (String, String) {
    let mut src = String::new();
    let mut dense = String::new();
    for (i, (p, s)) in parts.iter().enumerate() {
        if i > 0 {
            src.push_str(SEPARATORS[s % SEPARATORS.len()]);
        }
        let piece = PIECES[p % PIECES.len()];
        src.push_str(piece);
        dense.push_str(piece);
    }
    (src, dense)
}

fn runner() -> TestRunner {
    TestRunner::new(Config {
        cases: 256,
        ..Config::default()
    })
}

#[test]
fn lexemes_concatenate_to_source_without_trivia() {
    let strat = prop::collection::vec((any::<usize>(), any::<usize>()), 0..40);
    runner()
        .run(&strat, |parts| {
            let (src, dense) = build(&parts);
            let file = SourceFile::new(FileId(0), "p.kl", src.clone());
            let mut diags = Diagnostics::new();
            let tokens = lex(&file, &mut diags);
            if !diags.is_empty() {
                return Err(TestCaseError::fail(format!("unexpected diagnostics for {src:?}")));
            }
            let joined: String = tokens.iter().map(|t| t.lexeme.as_str()).collect();
            if joined != dense {
                return Err(TestCaseError::fail(format!("{joined:?} != {dense:?}")));
            }
            let eofs = tokens.iter().filter(|t| t.kind == TokenKind::Eof).count();
            if eofs != 1 || tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
                return Err(TestCaseError::fail("stream must end with a single Eof"));
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn token_positions_never_decrease() {
    // Arbitrary printable input, including malformed fragments.
    let strat = "[ -~\n]{0,120}";
    runner()
        .run(&strat, |src: String| {
            let file = SourceFile::new(FileId(0), "p.kl", src.clone());
            let mut diags = Diagnostics::new();
            let tokens = lex(&file, &mut diags);
            for pair in tokens.windows(2) {
                if pair[1].pos < pair[0].pos {
                    return Err(TestCaseError::fail(format!(
                        "{:?} precedes {:?} in {src:?}",
                        pair[1].pos, pair[0].pos
                    )));
                }
            }
            Ok(())
        })
        .unwrap();
}
