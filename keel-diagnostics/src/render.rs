#![forbid(unsafe_code)]

use std::fmt::Write as _;

use keel_ast::FileTable;

use crate::{Diagnostics, LayerError};

/// Render every diagnostic in flush order as plain text.
///
/// Each entry starts with `<file>:<line>:<col>: <severity>: [<code>] <message>`
/// and, when it references a token, is followed by `context_lines` lines of
/// source above and below with a caret line under the offending column.
pub fn render_plain(diags: &Diagnostics, files: &FileTable, context_lines: usize) -> String {
    let mut out = String::new();
    for err in diags.sorted() {
        render_one(&mut out, err, files, context_lines);
    }
    out
}

fn render_one(out: &mut String, err: &LayerError, files: &FileTable, context_lines: usize) {
    let severity = err.severity.display();
    let Some(token) = err.tokens.first() else {
        let _ = writeln!(out, "{severity}: [{}] {}", err.code, err.message);
        render_trailer(out, err);
        return;
    };

    let pos = token.position;
    let path = files
        .path(pos.file)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    let _ = writeln!(
        out,
        "{path}:{}:{}: {severity}: [{}] {}",
        pos.line, pos.column, err.code, err.message
    );

    if let Some(file) = files.get(pos.file) {
        let ctx = context_lines as u32;
        let first = pos.line.saturating_sub(ctx).max(1);
        let last = pos.line.saturating_add(ctx);
        for line in first..=last {
            let Some(text) = file.line_text(line) else {
                break;
            };
            let _ = writeln!(out, "{line:>4} | {text}");
            if line == pos.line {
                let col = pos.column.saturating_sub(1) as usize;
                let remaining = text.len().saturating_sub(col);
                let width = token.lexeme.len().min(remaining).max(1);
                let _ = writeln!(out, "     | {}{}", " ".repeat(col), "^".repeat(width));
            }
        }
    }

    render_trailer(out, err);
}

fn render_trailer(out: &mut String, err: &LayerError) {
    if let Some(scope) = &err.scope {
        let _ = writeln!(out, "  = scope: {}", scope.label);
    }
    if let Some(detail) = &err.detail {
        let _ = writeln!(out, "  = note: {detail}");
    }
    for s in &err.suggestions {
        let _ = writeln!(out, "  = help: {s}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codes, Layer, LayerError};
    use keel_ast::span;

    fn table() -> FileTable {
        let mut files = FileTable::new();
        files.add("demo.kl", "fn main() {\n  int a = 1;\n  b = 2;\n  print(a);\n}\n");
        files
    }

    #[test]
    fn header_and_caret_point_at_token() {
        let files = table();
        let file = files.iter().next().unwrap();
        let mut diags = Diagnostics::new();
        diags.push(
            LayerError::error(Layer::Semantic, codes::SEMA_UNDECLARED, "undeclared identifier `b`")
                .at(file, span(27, 1)),
        );
        let text = render_plain(&diags, &files, 1);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "demo.kl:3:3: error: [4001] undeclared identifier `b`");
        assert_eq!(lines[1], "   2 |   int a = 1;");
        assert_eq!(lines[2], "   3 |   b = 2;");
        assert_eq!(lines[3], "     |   ^");
        assert_eq!(lines[4], "   4 |   print(a);");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn context_is_clamped_at_file_edges() {
        let files = table();
        let file = files.iter().next().unwrap();
        let mut diags = Diagnostics::new();
        diags.push(
            LayerError::error(Layer::Parser, codes::PARSE_EXPECTED_TOKEN, "expected `;`")
                .at(file, span(0, 2)),
        );
        let text = render_plain(&diags, &files, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "   1 | fn main() {");
        assert_eq!(lines[2], "     | ^^");
        assert_eq!(lines[3], "   2 |   int a = 1;");
        assert_eq!(lines[4], "   3 |   b = 2;");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn positionless_entries_have_bare_header_and_help() {
        let files = table();
        let mut diags = Diagnostics::new();
        diags.push(
            LayerError::fatal(Layer::Raii, codes::RAII_PRECONDITION, "input is not contextualized")
                .with_detail("run the semantic pass first")
                .with_suggestion("fix the reported errors"),
        );
        let text = render_plain(&diags, &files, 2);
        assert_eq!(
            text,
            "fatal: [5000] input is not contextualized\n  = note: run the semantic pass first\n  = help: fix the reported errors\n"
        );
    }
}
