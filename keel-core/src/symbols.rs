#![forbid(unsafe_code)]

use keel_ast::{NodeId, Span};

use crate::types::TypeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Local,
    /// The induction variable of a `for` loop.
    LoopVar,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeId,
    pub kind: SymbolKind,
    /// Something was stored: an initializer, default construction, or an
    /// assignment earlier in source order.
    pub initialized: bool,
    pub is_const: bool,
    /// `VarDecl` or `ForStmt` that introduced the symbol.
    pub decl: NodeId,
    pub span: Span,
    pub used: bool,
}

/// Arena of every symbol declared in the program.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn add(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.symbols.get_mut(id.0 as usize)
    }

    pub fn name(&self, id: SymbolId) -> &str {
        self.get(id).map(|s| s.name.as_str()).unwrap_or("<?>")
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// One lexical scope: names in insertion order.
#[derive(Clone, Debug)]
pub struct Scope {
    pub block: NodeId,
    entries: Vec<(String, SymbolId)>,
}

impl Scope {
    pub fn new(block: NodeId) -> Self {
        Self {
            block,
            entries: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Insert `name`; returns the existing symbol instead if the name is taken.
    pub fn insert(&mut self, name: &str, id: SymbolId) -> Result<(), SymbolId> {
        if let Some(existing) = self.get(name) {
            return Err(existing);
        }
        self.entries.push((name.to_string(), id));
        Ok(())
    }

    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }
}

/// Stack of scopes searched innermost-first.
#[derive(Clone, Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn push(&mut self, block: NodeId) {
        self.scopes.push(Scope::new(block));
    }

    pub fn pop(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    pub fn current_mut(&mut self) -> Option<&mut Scope> {
        self.scopes.last_mut()
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_innermost_and_rejects_same_scope_redeclaration() {
        let mut stack = ScopeStack::default();
        stack.push(NodeId(0));
        stack.current_mut().unwrap().insert("x", SymbolId(0)).unwrap();
        stack.push(NodeId(1));
        stack.current_mut().unwrap().insert("x", SymbolId(1)).unwrap();
        assert_eq!(stack.lookup("x"), Some(SymbolId(1)));
        assert_eq!(stack.current_mut().unwrap().insert("x", SymbolId(2)), Err(SymbolId(1)));
        stack.pop();
        assert_eq!(stack.lookup("x"), Some(SymbolId(0)));
        assert_eq!(stack.lookup("y"), None);
    }

    #[test]
    fn scope_preserves_insertion_order() {
        let mut scope = Scope::new(NodeId(0));
        for (i, name) in ["c", "a", "b"].iter().enumerate() {
            scope.insert(name, SymbolId(i as u32)).unwrap();
        }
        let order: Vec<_> = scope.symbols().collect();
        assert_eq!(order, vec![SymbolId(0), SymbolId(1), SymbolId(2)]);
    }
}
