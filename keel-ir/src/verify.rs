#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::ir::{BlockId, FunctionIR, InstKind, ModuleIR, Operand, Terminator, Type, ValueId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("IR verification failed in `{function}`: {message}")]
pub struct VerifyError {
    pub function: String,
    pub message: String,
}

/// Structural well-formedness check run before a module is printed.
pub fn validate_module(module: &ModuleIR) -> Result<(), VerifyError> {
    for (name, f) in &module.functions {
        if module.externs.contains_key(name) {
            return Err(VerifyError {
                function: name.clone(),
                message: "defined and declared external at the same time".to_string(),
            });
        }
        validate_function(module, name, f)?;
    }
    Ok(())
}

fn validate_function(module: &ModuleIR, name: &str, f: &FunctionIR) -> Result<(), VerifyError> {
    let fail = |message: String| VerifyError {
        function: name.to_string(),
        message,
    };

    if f.name != name {
        return Err(fail(format!("keyed under a different name (`{}`)", f.name)));
    }
    if f.blocks.is_empty() {
        return Err(fail("function has no blocks".to_string()));
    }

    let mut block_ids = BTreeSet::new();
    for bb in &f.blocks {
        if !block_ids.insert(bb.id) {
            return Err(fail(format!("duplicate block id bb{}", bb.id.0)));
        }
    }
    if !block_ids.contains(&f.entry) {
        return Err(fail(format!("entry block bb{} missing", f.entry.0)));
    }

    // Pass 1: every definition, and which values are stack slots.
    let mut defined: HashMap<ValueId, Type> = HashMap::new();
    let mut slots: HashMap<ValueId, Type> = HashMap::new();
    for bb in &f.blocks {
        for inst in &bb.insts {
            let Some(dest) = inst.dest else { continue };
            let ty = match &inst.kind {
                InstKind::Alloca { ty } => {
                    if bb.id != f.entry {
                        return Err(fail(format!("alloca %v{} outside the entry block", dest.0)));
                    }
                    slots.insert(dest, *ty);
                    Type::Ptr
                }
                InstKind::Load { ty, .. } => *ty,
                InstKind::Binary { op, ty, .. } => {
                    if op.is_compare() {
                        Type::I1
                    } else {
                        *ty
                    }
                }
                InstKind::Zext { .. } => Type::I32,
                InstKind::Call { ret, .. } => *ret,
                InstKind::Store { .. } => {
                    return Err(fail("store produces no value".to_string()));
                }
            };
            if ty == Type::Void {
                return Err(fail(format!("%v{} bound to a void result", dest.0)));
            }
            if defined.insert(dest, ty).is_some() {
                return Err(fail(format!("%v{} defined more than once", dest.0)));
            }
        }
    }

    let operand_ty = |op: &Operand| -> Result<Type, VerifyError> {
        match op {
            Operand::Value(v) => defined
                .get(v)
                .copied()
                .ok_or_else(|| fail(format!("use of undefined value %v{}", v.0))),
            Operand::ConstI32(_) => Ok(Type::I32),
            Operand::ConstI1(_) => Ok(Type::I1),
            Operand::Global(g) => {
                if module.strings.iter().any(|s| &s.name == g) {
                    Ok(Type::Ptr)
                } else {
                    Err(fail(format!("reference to unknown global @{g}")))
                }
            }
        }
    };
    let expect = |op: &Operand, want: Type| -> Result<(), VerifyError> {
        let got = operand_ty(op)?;
        if got != want {
            return Err(fail(format!(
                "operand has type {} where {} is required",
                got.as_str(),
                want.as_str()
            )));
        }
        Ok(())
    };
    let slot = |ptr: &ValueId, ty: Type| -> Result<(), VerifyError> {
        match slots.get(ptr) {
            Some(slot_ty) if *slot_ty == ty => Ok(()),
            Some(slot_ty) => Err(fail(format!(
                "%v{} holds {} but is accessed as {}",
                ptr.0,
                slot_ty.as_str(),
                ty.as_str()
            ))),
            None => Err(fail(format!("%v{} is not a stack slot", ptr.0))),
        }
    };
    let target = |b: &BlockId| -> Result<(), VerifyError> {
        if block_ids.contains(b) {
            Ok(())
        } else {
            Err(fail(format!("branch to missing block bb{}", b.0)))
        }
    };

    // Pass 2: uses.
    for bb in &f.blocks {
        for inst in &bb.insts {
            match &inst.kind {
                InstKind::Alloca { .. } => {}
                InstKind::Load { ty, ptr } => slot(ptr, *ty)?,
                InstKind::Store { ty, value, ptr } => {
                    slot(ptr, *ty)?;
                    expect(value, *ty)?;
                }
                InstKind::Binary { ty, left, right, .. } => {
                    expect(left, *ty)?;
                    expect(right, *ty)?;
                }
                InstKind::Zext { value } => expect(value, Type::I1)?,
                InstKind::Call { callee, ret, args } => {
                    let Some((sig_ret, params, variadic)) = module.signature(callee) else {
                        return Err(fail(format!("call to undeclared function @{callee}")));
                    };
                    if sig_ret != *ret {
                        return Err(fail(format!("call to @{callee} expects a {} result", sig_ret.as_str())));
                    }
                    if args.len() < params.len() || (!variadic && args.len() != params.len()) {
                        return Err(fail(format!(
                            "call to @{callee} with {} argument(s), expected {}",
                            args.len(),
                            params.len()
                        )));
                    }
                    for (i, (ty, op)) in args.iter().enumerate() {
                        if let Some(param) = params.get(i) {
                            if param != ty {
                                return Err(fail(format!(
                                    "argument {i} of @{callee} is {} but the parameter is {}",
                                    ty.as_str(),
                                    param.as_str()
                                )));
                            }
                        }
                        expect(op, *ty)?;
                    }
                    if *ret == Type::Void && inst.dest.is_some() {
                        return Err(fail(format!("void call to @{callee} has a result")));
                    }
                }
            }
        }

        match &bb.term {
            Terminator::Return(None) => {
                if f.ret != Type::Void {
                    return Err(fail(format!("bb{} returns void from a {} function", bb.id.0, f.ret.as_str())));
                }
            }
            Terminator::Return(Some((ty, op))) => {
                if *ty != f.ret {
                    return Err(fail(format!("bb{} returns {} from a {} function", bb.id.0, ty.as_str(), f.ret.as_str())));
                }
                expect(op, *ty)?;
            }
            Terminator::Br(b) => target(b)?,
            Terminator::CondBr {
                cond,
                then_bb,
                else_bb,
            } => {
                expect(cond, Type::I1)?;
                target(then_bb)?;
                target(else_bb)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, Inst};

    fn function(blocks: Vec<BasicBlock>) -> ModuleIR {
        let mut m = ModuleIR::new("t", "x86_64-unknown-linux-gnu");
        m.functions.insert(
            "f".to_string(),
            FunctionIR {
                name: "f".to_string(),
                span: keel_ast::span(0, 0),
                ret: Type::Void,
                blocks,
                entry: BlockId(0),
            },
        );
        m
    }

    fn inst(dest: Option<u32>, kind: InstKind) -> Inst {
        Inst {
            span: keel_ast::span(0, 0),
            dest: dest.map(ValueId),
            kind,
        }
    }

    #[test]
    fn accepts_a_minimal_function() {
        let m = function(vec![BasicBlock {
            id: BlockId(0),
            insts: vec![
                inst(Some(0), InstKind::Alloca { ty: Type::I32 }),
                inst(
                    None,
                    InstKind::Store {
                        ty: Type::I32,
                        value: Operand::ConstI32(1),
                        ptr: ValueId(0),
                    },
                ),
            ],
            term: Terminator::Return(None),
        }]);
        assert_eq!(validate_module(&m), Ok(()));
    }

    #[test]
    fn rejects_branch_to_missing_block() {
        let m = function(vec![BasicBlock {
            id: BlockId(0),
            insts: Vec::new(),
            term: Terminator::Br(BlockId(7)),
        }]);
        let err = validate_module(&m).unwrap_err();
        assert!(err.message.contains("bb7"), "{err}");
    }

    #[test]
    fn rejects_undefined_values_and_undeclared_callees() {
        let m = function(vec![BasicBlock {
            id: BlockId(0),
            insts: vec![inst(
                Some(1),
                InstKind::Binary {
                    op: crate::ir::BinOp::Add,
                    ty: Type::I32,
                    left: Operand::Value(ValueId(0)),
                    right: Operand::ConstI32(1),
                },
            )],
            term: Terminator::Return(None),
        }]);
        assert!(validate_module(&m).unwrap_err().message.contains("undefined value"));

        let m = function(vec![BasicBlock {
            id: BlockId(0),
            insts: vec![inst(
                None,
                InstKind::Call {
                    callee: "nowhere".to_string(),
                    ret: Type::Void,
                    args: Vec::new(),
                },
            )],
            term: Terminator::Return(None),
        }]);
        assert!(validate_module(&m).unwrap_err().message.contains("undeclared"));
    }

    #[test]
    fn rejects_mismatched_return() {
        let m = function(vec![BasicBlock {
            id: BlockId(0),
            insts: Vec::new(),
            term: Terminator::Return(Some((Type::I32, Operand::ConstI32(0)))),
        }]);
        assert!(validate_module(&m).is_err());
    }
}
