#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};

use keel_ast::{Block, CtorBody, CtorKind, NodeId, Program, Span, Stmt};

use crate::symbols::{SymbolId, SymbolTable};
use crate::types::{TypeId, TypeTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtorState {
    Defaulted,
    Deleted,
    UserDefined,
}

impl From<&CtorBody> for CtorState {
    fn from(body: &CtorBody) -> Self {
        match body {
            CtorBody::Defaulted => CtorState::Defaulted,
            CtorBody::Deleted => CtorState::Deleted,
            CtorBody::Body(_) => CtorState::UserDefined,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: String,
    pub ty: TypeId,
    pub decl: NodeId,
    pub span: Span,
    pub fields: Vec<FieldInfo>,
    pub ctors: HashMap<CtorKind, CtorState>,
}

impl ClassInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Implicitly available unless explicitly deleted.
    pub fn has(&self, kind: CtorKind) -> bool {
        self.ctors.get(&kind) != Some(&CtorState::Deleted)
    }
}

#[derive(Clone, Debug)]
pub struct FunctionInfo {
    pub name: String,
    pub ty: TypeId,
    pub decl: NodeId,
    pub span: Span,
}

/// Everything the semantic pass learned about a program.
///
/// Side tables are keyed by `NodeId` so the AST itself stays untouched.
#[derive(Clone, Debug, Default)]
pub struct Context {
    pub types: TypeTable,
    pub symbols: SymbolTable,
    /// Type of every expression.
    pub expr_types: HashMap<NodeId, TypeId>,
    /// Variable-reference expression to the symbol it names.
    pub resolutions: HashMap<NodeId, SymbolId>,
    /// `VarDecl` / `ForStmt` to the symbol it declares.
    pub decl_symbols: HashMap<NodeId, SymbolId>,
    /// Block to the symbols declared directly in it, in declaration order.
    pub scope_locals: HashMap<NodeId, Vec<SymbolId>>,
    pub classes: BTreeMap<String, ClassInfo>,
    pub functions: BTreeMap<String, FunctionInfo>,
}

impl Context {
    pub fn expr_type(&self, expr: NodeId) -> TypeId {
        self.expr_types
            .get(&expr)
            .copied()
            .unwrap_or(TypeTable::UNKNOWN)
    }

    pub fn resolve(&self, expr: NodeId) -> Option<SymbolId> {
        self.resolutions.get(&expr).copied()
    }

    pub fn locals_of(&self, block: NodeId) -> &[SymbolId] {
        self.scope_locals
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if this context was produced for `program`: every block and
    /// declaration in it has side-table entries.
    pub fn covers(&self, program: &Program) -> bool {
        let ctor_blocks = program
            .classes
            .iter()
            .flat_map(|c| c.ctors.iter())
            .filter_map(|c| match &c.body {
                CtorBody::Body(b) => Some(b),
                _ => None,
            });
        program
            .functions
            .iter()
            .map(|f| &f.body)
            .chain(ctor_blocks)
            .all(|b| self.covers_block(b))
    }

    fn covers_block(&self, block: &Block) -> bool {
        if !self.scope_locals.contains_key(&block.id) {
            return false;
        }
        block.stmts.iter().all(|stmt| match stmt {
            Stmt::VarDecl(d) => self.decl_symbols.contains_key(&d.id),
            Stmt::Block(b) => self.covers_block(b),
            Stmt::If(s) => {
                self.covers_block(&s.then_block)
                    && s.else_block.as_ref().is_none_or(|b| self.covers_block(b))
            }
            Stmt::While(s) => self.covers_block(&s.body),
            Stmt::For(s) => self.decl_symbols.contains_key(&s.id) && self.covers_block(&s.body),
            _ => true,
        })
    }
}
