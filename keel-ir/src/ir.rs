#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use keel_ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    I1,
    I32,
    Ptr,
}

impl Type {
    pub fn as_str(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I32 => "i32",
            Type::Ptr => "ptr",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,

    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,

    And,
}

impl BinOp {
    pub fn instr(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::Eq => "icmp eq",
            BinOp::Ne => "icmp ne",
            BinOp::Slt => "icmp slt",
            BinOp::Sgt => "icmp sgt",
            BinOp::Sle => "icmp sle",
            BinOp::Sge => "icmp sge",
            BinOp::And => "and",
        }
    }

    pub fn is_compare(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Slt | BinOp::Sgt | BinOp::Sle | BinOp::Sge
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Value(ValueId),
    ConstI32(i32),
    ConstI1(bool),
    /// Address of a module-level string constant.
    Global(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    /// Stack slot for a local; only valid in the entry block.
    Alloca { ty: Type },
    Load { ty: Type, ptr: ValueId },
    Store { ty: Type, value: Operand, ptr: ValueId },
    Binary {
        op: BinOp,
        /// Operand type; comparisons produce `i1`.
        ty: Type,
        left: Operand,
        right: Operand,
    },
    /// Widen an `i1` to `i32`.
    Zext { value: Operand },
    Call {
        callee: String,
        ret: Type,
        args: Vec<(Type, Operand)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inst {
    pub span: Span,
    pub dest: Option<ValueId>,
    pub kind: InstKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Return(Option<(Type, Operand)>),
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub insts: Vec<Inst>,
    pub term: Terminator,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionIR {
    pub name: String,
    pub span: Span,
    pub ret: Type,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl FunctionIR {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }
}

/// An externally provided function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternDecl {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

/// A NUL-terminated byte string emitted as a private constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalString {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModuleIR {
    pub name: String,
    pub target_triple: String,
    pub functions: BTreeMap<String, FunctionIR>,
    pub externs: BTreeMap<String, ExternDecl>,
    pub strings: Vec<GlobalString>,
}

impl ModuleIR {
    pub fn new(name: impl Into<String>, target_triple: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_triple: target_triple.into(),
            functions: BTreeMap::new(),
            externs: BTreeMap::new(),
            strings: Vec::new(),
        }
    }

    /// Intern `text` (without its NUL) and return the global's name.
    pub fn intern_string(&mut self, text: &str) -> String {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        if let Some(existing) = self.strings.iter().find(|g| g.bytes == bytes) {
            return existing.name.clone();
        }
        let name = format!(".str{}", self.strings.len());
        self.strings.push(GlobalString {
            name: name.clone(),
            bytes,
        });
        name
    }

    /// Signature of `name` as a call target, if it is defined or declared.
    /// Defined functions take no parameters.
    pub fn signature(&self, name: &str) -> Option<(Type, &[Type], bool)> {
        if let Some(f) = self.functions.get(name) {
            return Some((f.ret, &[], false));
        }
        self.externs
            .get(name)
            .map(|e| (e.ret, e.params.as_slice(), e.variadic))
    }
}

#[derive(Default, Debug)]
pub struct IdGen {
    next_block: u32,
    next_value: u32,
}

impl IdGen {
    pub fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_share_a_global() {
        let mut m = ModuleIR::new("t", "x86_64-unknown-linux-gnu");
        let a = m.intern_string("%d\n");
        let b = m.intern_string("hi\n");
        let c = m.intern_string("%d\n");
        assert_eq!(a, ".str0");
        assert_eq!(b, ".str1");
        assert_eq!(a, c);
        assert_eq!(m.strings[0].bytes, b"%d\n\0");
    }
}
