#![forbid(unsafe_code)]

use keel_ast::{
    BinOp, Block, CallExpr, CleanupAction, ClassDef, CtorBody, CtorKind, Expr, ExprKind, Program,
    Stmt, TypeModifier, TypeName, TypeRef,
};

const INDENT: &str = "    ";

/// Pretty-print a program in canonical source form.
///
/// Synthesized cleanup statements are printed as `cleanup <var> ...;` lines,
/// which is how the RAII rewrite is inspected with `--stop-after=raii`.
pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    let mut first = true;
    for class in &program.classes {
        if !first {
            out.push('\n');
        }
        first = false;
        fmt_class(&mut out, class);
    }
    for func in &program.functions {
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str("fn ");
        out.push_str(&func.name.node);
        out.push_str("() ");
        fmt_block(&mut out, 0, &func.body);
        out.push('\n');
    }
    out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, expr, Prec::Lowest);
    out
}

fn fmt_class(out: &mut String, class: &ClassDef) {
    out.push_str("class ");
    out.push_str(&class.name.node);
    out.push_str(" {\n");
    for field in &class.fields {
        indent_line(out, 1);
        fmt_type_ref(out, &field.ty);
        out.push(' ');
        out.push_str(&field.name.node);
        out.push_str(";\n");
    }
    for ctor in &class.ctors {
        indent_line(out, 1);
        if ctor.explicit {
            out.push_str("explicit ");
        }
        let name = &class.name.node;
        match ctor.kind {
            CtorKind::Default => out.push_str(&format!("{name}()")),
            CtorKind::Copy => out.push_str(&format!("{name}(const {name}& other)")),
            CtorKind::Move => out.push_str(&format!("{name}({name}&& other)")),
            CtorKind::Destructor => out.push_str(&format!("~{name}()")),
        }
        match &ctor.body {
            CtorBody::Defaulted => out.push_str(" = default;\n"),
            CtorBody::Deleted => out.push_str(" = delete;\n"),
            CtorBody::Body(block) => {
                out.push(' ');
                fmt_block(out, 1, block);
                out.push('\n');
            }
        }
    }
    out.push_str("};\n");
}

fn fmt_block(out: &mut String, indent: usize, block: &Block) {
    out.push_str("{\n");
    for stmt in &block.stmts {
        fmt_stmt(out, indent + 1, stmt);
    }
    indent_line(out, indent);
    out.push('}');
}

fn fmt_stmt(out: &mut String, indent: usize, stmt: &Stmt) {
    indent_line(out, indent);
    match stmt {
        Stmt::VarDecl(s) => {
            fmt_type_ref(out, &s.ty);
            out.push(' ');
            out.push_str(&s.name.node);
            if let Some(init) = &s.init {
                out.push_str(" = ");
                fmt_expr(out, init, Prec::Lowest);
            }
            out.push(';');
        }
        Stmt::Assign(s) => {
            fmt_expr(out, &s.target, Prec::Lowest);
            out.push_str(" = ");
            fmt_expr(out, &s.expr, Prec::Lowest);
            out.push(';');
        }
        Stmt::Call(s) => {
            fmt_call(out, &s.call);
            out.push(';');
        }
        Stmt::Block(b) => fmt_block(out, indent, b),
        Stmt::If(s) => {
            out.push_str("if (");
            fmt_expr(out, &s.cond, Prec::Lowest);
            out.push_str(") ");
            fmt_block(out, indent, &s.then_block);
            if let Some(else_block) = &s.else_block {
                out.push_str(" else ");
                fmt_block(out, indent, else_block);
            }
        }
        Stmt::While(s) => {
            out.push_str("while (");
            fmt_expr(out, &s.cond, Prec::Lowest);
            out.push_str(") ");
            fmt_block(out, indent, &s.body);
        }
        Stmt::For(s) => {
            out.push_str("for (");
            out.push_str(&s.var.node);
            out.push_str(" in ");
            fmt_expr(out, &s.iter, Prec::Lowest);
            out.push_str(") ");
            fmt_block(out, indent, &s.body);
        }
        Stmt::Return(s) => {
            out.push_str("return");
            if let Some(v) = &s.value {
                out.push(' ');
                fmt_expr(out, v, Prec::Lowest);
            }
            out.push(';');
        }
        Stmt::Defer(s) => {
            out.push_str("defer ");
            fmt_call(out, &s.call);
            out.push(';');
        }
        Stmt::Cleanup(s) => {
            out.push_str("cleanup ");
            out.push_str(&s.var.node);
            match &s.action {
                CleanupAction::Destructor => {}
                CleanupAction::Deferred(call) => {
                    out.push_str(" => ");
                    fmt_call(out, call);
                }
                CleanupAction::ReleasedBy(owner) => {
                    out.push_str(" released by ");
                    out.push_str(owner);
                }
            }
            out.push(';');
        }
    }
    out.push('\n');
}

fn fmt_call(out: &mut String, call: &CallExpr) {
    out.push_str(&call.callee.node);
    out.push('(');
    for (i, a) in call.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_expr(out, a, Prec::Lowest);
    }
    out.push(')');
}

fn fmt_type_ref(out: &mut String, ty: &TypeRef) {
    if ty.is_const {
        out.push_str("const ");
    }
    match &ty.base {
        TypeName::Int => out.push_str("int"),
        TypeName::Bool => out.push_str("bool"),
        TypeName::Void => out.push_str("void"),
        TypeName::Auto => out.push_str("auto"),
        TypeName::Named(n) => out.push_str(&n.node),
    }
    for m in &ty.modifiers {
        out.push(match m {
            TypeModifier::Pointer => '*',
            TypeModifier::Reference => '&',
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    And,
    Cmp,
    Add,
    Mul,
    Postfix,
}

fn bin_prec(op: BinOp) -> Prec {
    match op {
        BinOp::And => Prec::And,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => Prec::Cmp,
        BinOp::Add | BinOp::Sub => Prec::Add,
        BinOp::Mul | BinOp::Div | BinOp::Rem => Prec::Mul,
    }
}

fn fmt_expr(out: &mut String, expr: &Expr, parent_prec: Prec) {
    match &expr.kind {
        ExprKind::Var(id) => out.push_str(&id.node),
        ExprKind::IntLit(n) => out.push_str(&n.to_string()),
        ExprKind::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        ExprKind::StringLit(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\\\""));
            out.push('"');
        }
        ExprKind::Range(bound) => {
            out.push_str("range(");
            fmt_expr(out, bound, Prec::Lowest);
            out.push(')');
        }
        ExprKind::Field { base, field } => {
            fmt_expr(out, base, Prec::Postfix);
            out.push('.');
            out.push_str(&field.node);
        }
        ExprKind::Binary {
            left, op, right, ..
        } => {
            let my = bin_prec(*op);
            // Operators are left-associative: a right operand at the same
            // level needs parentheses.
            let right_needs_parens =
                matches!(&right.kind, ExprKind::Binary { op: r, .. } if bin_prec(*r) == my);
            let parens = my < parent_prec;
            if parens {
                out.push('(');
            }
            fmt_expr(out, left, my);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            if right_needs_parens {
                out.push('(');
                fmt_expr(out, right, Prec::Lowest);
                out.push(')');
            } else {
                fmt_expr(out, right, my);
            }
            if parens {
                out.push(')');
            }
        }
    }
}

fn indent_line(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
}
