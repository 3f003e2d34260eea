#![forbid(unsafe_code)]

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Int,
    Bool,
    Void,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Builtin(Builtin),
    /// Type of a string literal; only `print` accepts it.
    Str,
    Pointer(TypeId),
    Reference(TypeId),
    Array(TypeId, u64),
    Class(String),
    Function { params: Vec<TypeId>, ret: TypeId },
    /// Result of `range(n)`; only iterated by `for`.
    Sequence(TypeId),
    Unknown,
}

/// Interner for type kinds: structurally equal kinds share one `TypeId`.
#[derive(Clone, Debug)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    index: HashMap<TypeKind, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub const INT: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    pub const STR: TypeId = TypeId(3);
    pub const UNKNOWN: TypeId = TypeId(4);

    pub fn new() -> Self {
        let mut table = Self {
            kinds: Vec::new(),
            index: HashMap::new(),
        };
        // Order matches the associated constants above.
        table.intern(TypeKind::Builtin(Builtin::Int));
        table.intern(TypeKind::Builtin(Builtin::Bool));
        table.intern(TypeKind::Builtin(Builtin::Void));
        table.intern(TypeKind::Str);
        table.intern(TypeKind::Unknown);
        table
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(id) = self.index.get(&kind) {
            return *id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.index.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        self.kinds.get(id.0 as usize).unwrap_or(&TypeKind::Unknown)
    }

    pub fn pointer(&mut self, to: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer(to))
    }

    pub fn reference(&mut self, to: TypeId) -> TypeId {
        self.intern(TypeKind::Reference(to))
    }

    pub fn class(&mut self, name: &str) -> TypeId {
        self.intern(TypeKind::Class(name.to_string()))
    }

    pub fn sequence(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeKind::Sequence(elem))
    }

    pub fn function(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern(TypeKind::Function { params, ret })
    }

    pub fn is_unknown(&self, id: TypeId) -> bool {
        id == Self::UNKNOWN
    }

    /// Class name behind `id`, looking through one reference.
    pub fn class_name(&self, id: TypeId) -> Option<&str> {
        match self.kind(id) {
            TypeKind::Class(name) => Some(name),
            TypeKind::Reference(inner) => match self.kind(*inner) {
                TypeKind::Class(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Strip one reference layer; references read as their referent.
    pub fn deref(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Reference(inner) => *inner,
            _ => id,
        }
    }

    pub fn display(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Builtin(Builtin::Int) => "int".to_string(),
            TypeKind::Builtin(Builtin::Bool) => "bool".to_string(),
            TypeKind::Builtin(Builtin::Void) => "void".to_string(),
            TypeKind::Str => "string".to_string(),
            TypeKind::Pointer(t) => format!("{}*", self.display(*t)),
            TypeKind::Reference(t) => format!("{}&", self.display(*t)),
            TypeKind::Array(t, n) => format!("{}[{n}]", self.display(*t)),
            TypeKind::Class(name) => name.clone(),
            TypeKind::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.display(*p))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("fn({params}) -> {}", self.display(*ret))
            }
            TypeKind::Sequence(t) => format!("range<{}>", self.display(*t)),
            TypeKind::Unknown => "<unknown>".to_string(),
        }
    }
}
