#![forbid(unsafe_code)]

use std::fmt::Write as _;

use crate::ir::{BasicBlock, FunctionIR, InstKind, ModuleIR, Operand, Terminator, Type};

/// Render `module` as LLVM-style textual IR.
pub fn print_module(module: &ModuleIR) -> String {
    let mut out = String::new();
    out.push_str(&format!("; ModuleID = '{}'\n", module.name));
    out.push_str(&format!("source_filename = \"{}\"\n", module.name));
    out.push_str(&format!("target triple = \"{}\"\n\n", module.target_triple));

    for g in &module.strings {
        out.push_str(&format!(
            "@{} = private unnamed_addr constant [{} x i8] c\"{}\", align 1\n",
            g.name,
            g.bytes.len(),
            escape_bytes(&g.bytes)
        ));
    }
    if !module.strings.is_empty() {
        out.push('\n');
    }

    for (name, ext) in &module.externs {
        let mut params: Vec<&str> = ext.params.iter().map(|t| t.as_str()).collect();
        if ext.variadic {
            params.push("...");
        }
        out.push_str(&format!(
            "declare {} @{}({})\n",
            ext.ret.as_str(),
            name,
            params.join(", ")
        ));
    }
    if !module.externs.is_empty() {
        out.push('\n');
    }

    let mut first = true;
    for f in module.functions.values() {
        if !first {
            out.push('\n');
        }
        first = false;
        print_function(module, f, &mut out);
    }
    out
}

fn print_function(module: &ModuleIR, f: &FunctionIR, out: &mut String) {
    out.push_str(&format!("define {} @{}() {{\n", f.ret.as_str(), f.name));
    // Entry block first.
    let mut blocks: Vec<&BasicBlock> = f.blocks.iter().collect();
    blocks.sort_by_key(|b| b.id != f.entry);
    for bb in blocks {
        let _ = writeln!(out, "bb{}:", bb.id.0);
        for inst in &bb.insts {
            out.push_str("  ");
            if let Some(dest) = inst.dest {
                let _ = write!(out, "%v{} = ", dest.0);
            }
            match &inst.kind {
                InstKind::Alloca { ty } => {
                    let _ = write!(out, "alloca {}, align {}", ty.as_str(), align(*ty));
                }
                InstKind::Load { ty, ptr } => {
                    let _ = write!(out, "load {}, ptr %v{}, align {}", ty.as_str(), ptr.0, align(*ty));
                }
                InstKind::Store { ty, value, ptr } => {
                    let _ = write!(
                        out,
                        "store {} {}, ptr %v{}, align {}",
                        ty.as_str(),
                        operand(value),
                        ptr.0,
                        align(*ty)
                    );
                }
                InstKind::Binary {
                    op,
                    ty,
                    left,
                    right,
                } => {
                    let _ = write!(
                        out,
                        "{} {} {}, {}",
                        op.instr(),
                        ty.as_str(),
                        operand(left),
                        operand(right)
                    );
                }
                InstKind::Zext { value } => {
                    let _ = write!(out, "zext i1 {} to i32", operand(value));
                }
                InstKind::Call { callee, ret, args } => {
                    let args = args
                        .iter()
                        .map(|(t, op)| format!("{} {}", t.as_str(), operand(op)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    // Variadic callees need their full type at the call site.
                    let fn_ty = match module.externs.get(callee) {
                        Some(ext) if ext.variadic => {
                            let mut params: Vec<&str> = ext.params.iter().map(|t| t.as_str()).collect();
                            params.push("...");
                            format!("{} ({})", ret.as_str(), params.join(", "))
                        }
                        _ => ret.as_str().to_string(),
                    };
                    let _ = write!(out, "call {fn_ty} @{callee}({args})");
                }
            }
            out.push('\n');
        }
        match &bb.term {
            Terminator::Return(None) => out.push_str("  ret void\n"),
            Terminator::Return(Some((ty, op))) => {
                let _ = writeln!(out, "  ret {} {}", ty.as_str(), operand(op));
            }
            Terminator::Br(target) => {
                let _ = writeln!(out, "  br label %bb{}", target.0);
            }
            Terminator::CondBr {
                cond,
                then_bb,
                else_bb,
            } => {
                let _ = writeln!(
                    out,
                    "  br i1 {}, label %bb{}, label %bb{}",
                    operand(cond),
                    then_bb.0,
                    else_bb.0
                );
            }
        }
    }
    out.push_str("}\n");
}

fn operand(op: &Operand) -> String {
    match op {
        Operand::Value(v) => format!("%v{}", v.0),
        Operand::ConstI32(n) => n.to_string(),
        Operand::ConstI1(b) => b.to_string(),
        Operand::Global(g) => format!("@{g}"),
    }
}

fn align(ty: Type) -> u32 {
    match ty {
        Type::I32 => 4,
        Type::Ptr => 8,
        Type::I1 | Type::Void => 1,
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut data = String::new();
    for b in bytes {
        match *b {
            b'\\' => data.push_str("\\5C"),
            b'"' => data.push_str("\\22"),
            0x20..=0x7E => data.push(*b as char),
            other => data.push_str(&format!("\\{other:02X}")),
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_bytes_and_quotes() {
        assert_eq!(escape_bytes(b"say \"hi\"\n\0"), "say \\22hi\\22\\0A\\00");
        assert_eq!(escape_bytes(b"a\\b"), "a\\5Cb");
    }

    #[test]
    fn empty_module_has_header_only() {
        let m = ModuleIR::new("t.kl", "x86_64-unknown-linux-gnu");
        assert_eq!(
            print_module(&m),
            "; ModuleID = 't.kl'\nsource_filename = \"t.kl\"\ntarget triple = \"x86_64-unknown-linux-gnu\"\n\n"
        );
    }
}
