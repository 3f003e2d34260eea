#![forbid(unsafe_code)]

mod source;

use miette::SourceSpan;

pub use source::{FileId, FileTable, SourceFile, SourcePosition};

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Smallest span covering both `a` and `b`.
pub fn join(a: Span, b: Span) -> Span {
    let a0: usize = a.offset();
    let b0: usize = b.offset();
    let start = a0.min(b0);
    let end = (a0 + a.len()).max(b0 + b.len());
    span_between(start, end)
}

pub type Ident = Spanned<String>;

/// Stable identity of an AST node.
///
/// Assigned by the parser from a single counter per program. Later passes key
/// their side tables (types, resolutions, per-scope locals) by it instead of
/// holding references into the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub span: Span,
    pub functions: Vec<Function>,
    pub classes: Vec<ClassDef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDef {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub fields: Vec<FieldDef>,
    pub ctors: Vec<CtorDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub span: Span,
    pub ty: TypeRef,
    pub name: Ident,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CtorKind {
    Default,
    Copy,
    Move,
    Destructor,
}

impl CtorKind {
    pub fn describe(self) -> &'static str {
        match self {
            CtorKind::Default => "default constructor",
            CtorKind::Copy => "copy constructor",
            CtorKind::Move => "move constructor",
            CtorKind::Destructor => "destructor",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CtorBody {
    /// `= default;`
    Defaulted,
    /// `= delete;`
    Deleted,
    Body(Block),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CtorDecl {
    pub span: Span,
    pub kind: CtorKind,
    pub explicit: bool,
    pub body: CtorBody,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub span: Span,
    pub is_const: bool,
    pub base: TypeName,
    pub modifiers: Vec<TypeModifier>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeName {
    Int,
    Bool,
    Void,
    Auto,
    Named(Ident),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeModifier {
    Pointer,
    Reference,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn ends_with_return(&self) -> bool {
        matches!(self.stmts.last(), Some(Stmt::Return(_)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VarDecl(VarDecl),
    Assign(AssignStmt),
    Call(CallStmt),
    Block(Block),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Return(ReturnStmt),
    Defer(DeferStmt),
    /// Synthesized by the RAII pass; never produced by the parser.
    Cleanup(CleanupStmt),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VarDecl(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::Call(s) => s.span,
            Stmt::Block(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Defer(s) => s.span,
            Stmt::Cleanup(s) => s.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub id: NodeId,
    pub span: Span,
    pub ty: TypeRef,
    pub name: Ident,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Expr,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    pub id: NodeId,
    pub span: Span,
    pub callee: Ident,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallStmt {
    pub span: Span,
    pub call: CallExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Block,
}

/// `for (var in iter) body`. `id` doubles as the declaration id of `var`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub id: NodeId,
    pub span: Span,
    pub var: Ident,
    pub iter: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeferStmt {
    pub span: Span,
    pub call: CallExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CleanupStmt {
    pub span: Span,
    pub var: Ident,
    /// Declaration site of `var` (a `VarDecl` or `ForStmt` id).
    pub decl: NodeId,
    pub action: CleanupAction,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CleanupAction {
    /// Run the implicit destructor of the variable's type.
    Destructor,
    /// Run a `defer`red call in place of the destructor.
    Deferred(CallExpr),
    /// Released by the deferred call registered on the named variable.
    ReleasedBy(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

impl Expr {
    pub fn as_var(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Var(_) => true,
            ExprKind::Field { base, .. } => base.is_lvalue(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    BoolLit(bool),
    IntLit(u64),
    StringLit(String),
    Var(Ident),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        op_span: Span,
        right: Box<Expr>,
    },
    /// `base.field`
    Field {
        base: Box<Expr>,
        field: Ident,
    },
    /// `range(bound)`
    Range(Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_covers_both_spans_in_any_order() {
        let a = span(4, 2);
        let b = span(10, 3);
        assert_eq!(join(a, b), span_between(4, 13));
        assert_eq!(join(b, a), span_between(4, 13));
    }

    #[test]
    fn field_access_on_variable_is_an_lvalue() {
        let var = Expr {
            id: NodeId(0),
            span: span(0, 1),
            kind: ExprKind::Var(Ident::new(span(0, 1), "p".to_string())),
        };
        let field = Expr {
            id: NodeId(1),
            span: span(0, 3),
            kind: ExprKind::Field {
                base: Box::new(var.clone()),
                field: Ident::new(span(2, 1), "x".to_string()),
            },
        };
        let lit = Expr {
            id: NodeId(2),
            span: span(0, 1),
            kind: ExprKind::IntLit(1),
        };
        assert!(var.is_lvalue());
        assert!(field.is_lvalue());
        assert!(!lit.is_lvalue());
    }
}
