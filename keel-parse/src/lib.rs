#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use keel_ast::{Program, SourceFile};
use keel_diagnostics::Diagnostics;
use keel_lex::{Lexer, Token};

pub use error::ParseError;
pub use fmt::{format_expr, format_program};
pub use parser::{Parser, MAX_DEPTH};

/// Parse an already-lexed token stream, reporting every syntax error to `diags`.
pub fn parse_tokens(file: &SourceFile, tokens: &[Token], diags: &mut Diagnostics) -> Program {
    let mut parser = Parser::new(tokens);
    let (program, errors) = parser.parse_program_with_recovery();
    for err in errors {
        diags.push(err.into_layer_error(file));
    }
    program
}

/// Lex and parse `file` in one step.
pub fn parse_source(file: &SourceFile, diags: &mut Diagnostics) -> Program {
    let tokens = Lexer::new(file).lex(diags);
    parse_tokens(file, &tokens, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_ast::{CleanupAction, ExprKind, FileId, Stmt};
    use keel_diagnostics::codes;

    fn parse(src: &str) -> (Program, Diagnostics) {
        let file = SourceFile::new(FileId(0), "t.kl", src);
        let mut diags = Diagnostics::new();
        let program = parse_source(&file, &mut diags);
        (program, diags)
    }

    #[test]
    fn parse_and_format_round_trip() {
        let src = "fn main() {\n    int x = 1 + 2 * 3;\n    if (x < 10 && true) {\n        print(x);\n    } else {\n        x = x - (1 - 2);\n    }\n    return;\n}\n";
        let (program, diags) = parse(src);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(format_program(&program), src);
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let (program, _) = parse("fn main() { int x = 1 + 2 * 3; }");
        let Stmt::VarDecl(decl) = &program.functions[0].body.stmts[0] else {
            panic!("expected declaration");
        };
        let init = decl.init.as_ref().unwrap();
        assert_eq!(format_expr(init), "1 + 2 * 3");
        let ExprKind::Binary { right, .. } = &init.kind else {
            panic!("expected binary");
        };
        assert!(matches!(right.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn node_ids_are_unique() {
        let (program, _) = parse("fn main() { int a = 1; { int b = a; } }\nfn other() { print(1); }");
        let mut ids = vec![program.functions[0].id, program.functions[0].body.id];
        ids.push(program.functions[1].id);
        ids.push(program.functions[1].body.id);
        if let Stmt::Block(inner) = &program.functions[0].body.stmts[1] {
            ids.push(inner.id);
        }
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn missing_semicolon_recovers_at_next_statement() {
        let (program, diags) = parse("fn main() {\n  int x = 1\n  int y = 2;\n  print(y);\n}");
        let errs: Vec<_> = diags.iter().collect();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].code, codes::PARSE_EXPECTED_TOKEN);
        // `int x = 1 int y = 2;` is dropped as one statement; the call survives.
        assert_eq!(program.functions[0].body.stmts.len(), 1);
        assert!(matches!(program.functions[0].body.stmts[0], Stmt::Call(_)));
    }

    #[test]
    fn break_and_continue_are_rejected() {
        let (_, diags) = parse("fn main() { while (true) { break; continue; } }");
        let jumps = diags.with_code(codes::PARSE_UNSUPPORTED_JUMP).count();
        assert_eq!(jumps, 2);
    }

    #[test]
    fn stray_top_level_tokens_report_expected_item() {
        let (program, diags) = parse("int x; fn main() { }");
        assert_eq!(diags.with_code(codes::PARSE_EXPECTED_ITEM).count(), 1);
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn class_members_are_classified() {
        let src = "class Point {\n  int x;\n  int y;\n  Point() = default;\n  explicit Point(const Point& other) = delete;\n  Point(Point&& other) = default;\n  ~Point() { }\n};\nfn main() { Point p; p.x = 3; }";
        let (program, diags) = parse(src);
        assert!(diags.is_empty(), "{diags:?}");
        let class = &program.classes[0];
        assert_eq!(class.fields.len(), 2);
        let kinds: Vec<_> = class.ctors.iter().map(|c| (c.kind, c.explicit)).collect();
        assert_eq!(
            kinds,
            vec![
                (keel_ast::CtorKind::Default, false),
                (keel_ast::CtorKind::Copy, true),
                (keel_ast::CtorKind::Move, false),
                (keel_ast::CtorKind::Destructor, false),
            ]
        );
        assert!(matches!(program.functions[0].body.stmts[1], Stmt::Assign(_)));
    }

    #[test]
    fn mismatched_destructor_name_is_bad_ctor() {
        let (_, diags) = parse("class A { ~B() = default; };");
        assert_eq!(diags.with_code(codes::PARSE_BAD_CTOR).count(), 1);
    }

    #[test]
    fn deep_nesting_is_fatal() {
        let depth = MAX_DEPTH + 4;
        let src = format!("fn main() {}{}", "{".repeat(depth), "}".repeat(depth + 1));
        let (_, diags) = parse(&src);
        let fatal: Vec<_> = diags.with_code(codes::PARSE_TOO_DEEP).collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].severity, keel_diagnostics::Severity::Fatal);
    }

    #[test]
    fn cleanup_statements_have_a_textual_form() {
        let (mut program, _) = parse("fn main() { int x; }");
        let Stmt::VarDecl(decl) = program.functions[0].body.stmts[0].clone() else {
            panic!("expected declaration");
        };
        program.functions[0].body.stmts.push(Stmt::Cleanup(keel_ast::CleanupStmt {
            span: decl.span,
            var: decl.name.clone(),
            decl: decl.id,
            action: CleanupAction::ReleasedBy("y".to_string()),
        }));
        let text = format_program(&program);
        assert!(text.contains("cleanup x released by y;"), "{text}");
    }
}
