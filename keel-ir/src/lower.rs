#![forbid(unsafe_code)]

use std::collections::HashMap;

use keel_ast::{
    BinOp as AstBinOp, Block, CallExpr, CleanupAction, Expr, ExprKind, ForStmt, Function,
    IfStmt, Program, Span, Stmt, WhileStmt,
};
use keel_core::{Context, SymbolId, TypeId, TypeKind, TypeTable, PRINT};
use keel_diagnostics::codes;

use crate::error::EmitError;
use crate::ir::{
    BasicBlock, BinOp, BlockId, ExternDecl, FunctionIR, IdGen, Inst, InstKind, ModuleIR, Operand,
    Terminator, Type, ValueId,
};

/// Largest `range(N)` bound that is unrolled.
pub const MAX_UNROLL: u64 = 4096;

#[derive(Clone, Debug)]
pub struct EmitOptions {
    /// Runtime routine `print` lowers to.
    pub print_symbol: String,
    /// Defaults to the host triple.
    pub target_triple: Option<String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            print_symbol: PRINT.to_string(),
            target_triple: None,
        }
    }
}

impl EmitOptions {
    pub fn triple(&self) -> String {
        self.target_triple
            .clone()
            .unwrap_or_else(|| target_lexicon::HOST.to_string())
    }
}

/// Lowers a cleaned, fully typed program to `ModuleIR`.
pub struct Lowerer<'a> {
    ctx: &'a Context,
    opts: &'a EmitOptions,
    module: ModuleIR,
    errors: Vec<EmitError>,
}

/// Per-function construction state.
struct FnState {
    ids: IdGen,
    ret: Type,
    entry: BlockId,
    current: BlockId,
    insts: Vec<Inst>,
    allocas: Vec<Inst>,
    blocks: Vec<BasicBlock>,
    slots: HashMap<SymbolId, (ValueId, Type)>,
}

impl FnState {
    fn new(ret: Type) -> Self {
        let mut ids = IdGen::default();
        let entry = ids.fresh_block();
        Self {
            ids,
            ret,
            entry,
            current: entry,
            insts: Vec::new(),
            allocas: Vec::new(),
            blocks: Vec::new(),
            slots: HashMap::new(),
        }
    }

    fn push(&mut self, span: Span, kind: InstKind) -> ValueId {
        let dest = self.ids.fresh_value();
        self.insts.push(Inst {
            span,
            dest: Some(dest),
            kind,
        });
        dest
    }

    fn push_void(&mut self, span: Span, kind: InstKind) {
        self.insts.push(Inst {
            span,
            dest: None,
            kind,
        });
    }

    fn alloca(&mut self, sym: SymbolId, ty: Type, span: Span) -> ValueId {
        let dest = self.ids.fresh_value();
        self.allocas.push(Inst {
            span,
            dest: Some(dest),
            kind: InstKind::Alloca { ty },
        });
        self.slots.insert(sym, (dest, ty));
        dest
    }

    /// Close the current block with `term` and continue in `next`.
    fn terminate(&mut self, term: Terminator, next: BlockId) {
        self.blocks.push(BasicBlock {
            id: self.current,
            insts: std::mem::take(&mut self.insts),
            term,
        });
        self.current = next;
    }

    fn return_term(&self) -> Terminator {
        match self.ret {
            Type::Void => Terminator::Return(None),
            ty => Terminator::Return(Some((ty, Operand::ConstI32(0)))),
        }
    }

    fn finish(mut self, name: &str, span: Span) -> FunctionIR {
        let reached = self.current == self.entry
            || self.blocks.iter().any(|b| match &b.term {
                Terminator::Br(t) => *t == self.current,
                Terminator::CondBr {
                    then_bb, else_bb, ..
                } => *then_bb == self.current || *else_bb == self.current,
                Terminator::Return(_) => false,
            });
        // Trailing empty block opened after a `return` is dropped.
        if reached || !self.insts.is_empty() {
            let term = self.return_term();
            let next = self.ids.fresh_block();
            self.terminate(term, next);
        }

        let entry = self.entry;
        let allocas = std::mem::take(&mut self.allocas);
        if let Some(bb) = self.blocks.iter_mut().find(|b| b.id == entry) {
            bb.insts.splice(0..0, allocas);
        }
        FunctionIR {
            name: name.to_string(),
            span,
            ret: self.ret,
            blocks: self.blocks,
            entry,
        }
    }
}

impl<'a> Lowerer<'a> {
    pub fn new(ctx: &'a Context, opts: &'a EmitOptions, module_name: &str) -> Self {
        Self {
            ctx,
            opts,
            module: ModuleIR::new(module_name, opts.triple()),
            errors: Vec::new(),
        }
    }

    pub fn finish(self) -> (ModuleIR, Vec<EmitError>) {
        (self.module, self.errors)
    }

    pub fn lower_program(&mut self, program: &Program) {
        for class in &program.classes {
            log::trace!("class `{}` has no IR representation", class.name.node);
        }
        for func in &program.functions {
            if func.name.node == self.opts.print_symbol {
                self.errors.push(
                    EmitError::new(
                        codes::EMIT_UNSUPPORTED,
                        format!("function `{}` collides with the runtime print routine", func.name.node),
                        func.name.span,
                    )
                    .with_help("rename the function or configure a different print symbol"),
                );
                continue;
            }
            self.lower_function(func);
        }
        log::debug!(
            "emitter: {} function(s), {} extern(s), {} string(s)",
            self.module.functions.len(),
            self.module.externs.len(),
            self.module.strings.len()
        );
    }

    fn lower_function(&mut self, func: &Function) {
        let mut st = FnState::new(return_type(&func.name.node));
        self.lower_block(&mut st, &func.body);
        let ir = st.finish(&func.name.node, func.span);
        self.module.functions.insert(func.name.node.clone(), ir);
    }

    fn lower_block(&mut self, st: &mut FnState, block: &Block) {
        for stmt in &block.stmts {
            self.lower_stmt(st, stmt);
        }
    }

    fn lower_stmt(&mut self, st: &mut FnState, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => {
                let Some(sym) = self.ctx.decl_symbols.get(&decl.id).copied() else {
                    return;
                };
                let sym_ty = self.ctx.symbols.get(sym).map(|s| s.ty).unwrap_or(TypeTable::UNKNOWN);
                let Some(ty) = self.local_type(sym_ty, decl.name.span) else {
                    return;
                };
                let slot = st.alloca(sym, ty, decl.span);
                let value = match &decl.init {
                    Some(init) => self.lower_expr(st, init),
                    None => zero(ty),
                };
                st.push_void(decl.span, InstKind::Store { ty, value, ptr: slot });
            }
            Stmt::Assign(assign) => {
                let slot = assign
                    .target
                    .as_var()
                    .and_then(|_| self.ctx.resolve(assign.target.id))
                    .and_then(|sym| st.slots.get(&sym).copied());
                let Some((ptr, ty)) = slot else {
                    if assign.target.as_var().is_none() {
                        self.errors.push(EmitError::new(
                            codes::EMIT_UNSUPPORTED,
                            "only plain variables can be assigned in emitted code",
                            assign.target.span,
                        ));
                    }
                    return;
                };
                let value = self.lower_expr(st, &assign.expr);
                st.push_void(assign.span, InstKind::Store { ty, value, ptr });
            }
            Stmt::Call(call) => self.lower_call(st, &call.call),
            Stmt::Block(block) => self.lower_block(st, block),
            Stmt::If(s) => self.lower_if(st, s),
            Stmt::While(s) => self.lower_while(st, s),
            Stmt::For(s) => self.lower_for(st, s),
            Stmt::Return(_) => {
                let term = st.return_term();
                let dead = st.ids.fresh_block();
                st.terminate(term, dead);
            }
            // The synthesized cleanup statements carry the deferred calls.
            Stmt::Defer(_) => {}
            Stmt::Cleanup(cleanup) => match &cleanup.action {
                CleanupAction::Deferred(call) => self.lower_call(st, call),
                // Trivial destructors of `int` / `bool` locals.
                CleanupAction::Destructor | CleanupAction::ReleasedBy(_) => {}
            },
        }
    }

    fn lower_if(&mut self, st: &mut FnState, s: &IfStmt) {
        let cond = self.lower_expr(st, &s.cond);
        let then_bb = st.ids.fresh_block();
        let else_bb = s.else_block.as_ref().map(|_| st.ids.fresh_block());
        let merge = st.ids.fresh_block();
        st.terminate(
            Terminator::CondBr {
                cond,
                then_bb,
                else_bb: else_bb.unwrap_or(merge),
            },
            then_bb,
        );
        self.lower_block(st, &s.then_block);
        match (&s.else_block, else_bb) {
            (Some(else_block), Some(else_bb)) => {
                st.terminate(Terminator::Br(merge), else_bb);
                self.lower_block(st, else_block);
                st.terminate(Terminator::Br(merge), merge);
            }
            _ => st.terminate(Terminator::Br(merge), merge),
        }
    }

    fn lower_while(&mut self, st: &mut FnState, s: &WhileStmt) {
        let header = st.ids.fresh_block();
        let body = st.ids.fresh_block();
        let exit = st.ids.fresh_block();
        st.terminate(Terminator::Br(header), header);
        let cond = self.lower_expr(st, &s.cond);
        st.terminate(
            Terminator::CondBr {
                cond,
                then_bb: body,
                else_bb: exit,
            },
            body,
        );
        self.lower_block(st, &s.body);
        st.terminate(Terminator::Br(header), exit);
    }

    /// `for (v in range(N))` with a literal `N` becomes `N` straight-line copies.
    fn lower_for(&mut self, st: &mut FnState, s: &ForStmt) {
        let bound = match &s.iter.kind {
            ExprKind::Range(bound) => match bound.kind {
                ExprKind::IntLit(n) => Some(n),
                _ => None,
            },
            _ => None,
        };
        let Some(count) = bound else {
            self.errors.push(
                EmitError::new(
                    codes::EMIT_NON_LITERAL_BOUND,
                    "`for` loops need a literal `range` bound",
                    s.iter.span,
                )
                .with_help("use an integer literal such as `range(3)`, or a `while` loop"),
            );
            return;
        };
        if count > MAX_UNROLL {
            self.errors.push(EmitError::new(
                codes::EMIT_UNSUPPORTED,
                format!("`range({count})` is too large to unroll (limit {MAX_UNROLL})"),
                s.iter.span,
            ));
            return;
        }

        let Some(sym) = self.ctx.decl_symbols.get(&s.id).copied() else {
            return;
        };
        let slot = st.alloca(sym, Type::I32, s.var.span);
        log::trace!("unrolling `for ({} in range({count}))`", s.var.node);
        for i in 0..count {
            st.push_void(
                s.span,
                InstKind::Store {
                    ty: Type::I32,
                    value: Operand::ConstI32(i as i32),
                    ptr: slot,
                },
            );
            self.lower_block(st, &s.body);
        }
    }

    fn lower_call(&mut self, st: &mut FnState, call: &CallExpr) {
        if call.callee.node == PRINT {
            self.lower_print(st, call);
            return;
        }

        if self.ctx.functions.contains_key(&call.callee.node) {
            let ret = return_type(&call.callee.node);
            let kind = InstKind::Call {
                callee: call.callee.node.clone(),
                ret,
                args: Vec::new(),
            };
            match ret {
                Type::Void => st.push_void(call.span, kind),
                _ => {
                    st.push(call.span, kind);
                }
            }
            return;
        }

        // A runtime cleanup routine.
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let ty = match &arg.kind {
                ExprKind::StringLit(_) => Some(Type::Ptr),
                _ => self.value_type(self.ctx.expr_type(arg.id)),
            };
            let Some(ty) = ty else {
                self.errors.push(EmitError::new(
                    codes::EMIT_UNSUPPORTED,
                    format!(
                        "cannot pass a value of type `{}` to `{}`",
                        self.ctx.types.display(self.ctx.expr_type(arg.id)),
                        call.callee.node
                    ),
                    arg.span,
                ));
                return;
            };
            let value = match &arg.kind {
                ExprKind::StringLit(text) => Operand::Global(self.module.intern_string(text)),
                _ => self.lower_expr(st, arg),
            };
            args.push((ty, value));
        }

        let decl = ExternDecl {
            ret: Type::Void,
            params: args.iter().map(|(t, _)| *t).collect(),
            variadic: false,
        };
        match self.module.externs.get(&call.callee.node) {
            Some(existing) if *existing != decl => {
                self.errors.push(EmitError::new(
                    codes::EMIT_UNSUPPORTED,
                    format!("`{}` is called with conflicting argument types", call.callee.node),
                    call.span,
                ));
                return;
            }
            Some(_) => {}
            None => {
                self.module.externs.insert(call.callee.node.clone(), decl);
            }
        }
        st.push_void(
            call.span,
            InstKind::Call {
                callee: call.callee.node.clone(),
                ret: Type::Void,
                args,
            },
        );
    }

    fn lower_print(&mut self, st: &mut FnState, call: &CallExpr) {
        let Some(arg) = call.args.first() else {
            return;
        };
        let symbol = self.opts.print_symbol.clone();
        self.module.externs.entry(symbol.clone()).or_insert(ExternDecl {
            ret: Type::I32,
            params: vec![Type::Ptr],
            variadic: true,
        });

        let args = match &arg.kind {
            ExprKind::StringLit(text) => {
                let format = format!("{}\n", text.replace('%', "%%"));
                vec![(Type::Ptr, Operand::Global(self.module.intern_string(&format)))]
            }
            _ => {
                let ty = self.ctx.types.deref(self.ctx.expr_type(arg.id));
                let mut value = self.lower_expr(st, arg);
                if ty == TypeTable::BOOL {
                    value = Operand::Value(st.push(arg.span, InstKind::Zext { value }));
                }
                let format = self.module.intern_string("%d\n");
                vec![(Type::Ptr, Operand::Global(format)), (Type::I32, value)]
            }
        };
        st.push_void(
            call.span,
            InstKind::Call {
                callee: symbol,
                ret: Type::I32,
                args,
            },
        );
    }

    fn lower_expr(&mut self, st: &mut FnState, expr: &Expr) -> Operand {
        match &expr.kind {
            ExprKind::IntLit(n) => Operand::ConstI32(i32::try_from(*n).unwrap_or(i32::MAX)),
            ExprKind::BoolLit(b) => Operand::ConstI1(*b),
            ExprKind::Var(_) => {
                let slot = self
                    .ctx
                    .resolve(expr.id)
                    .and_then(|sym| st.slots.get(&sym).copied());
                match slot {
                    Some((ptr, ty)) => Operand::Value(st.push(expr.span, InstKind::Load { ty, ptr })),
                    // Its declaration was already rejected.
                    None => Operand::ConstI32(0),
                }
            }
            ExprKind::Binary {
                left, op, right, ..
            } => {
                let ty = self
                    .value_type(self.ctx.expr_type(left.id))
                    .unwrap_or(Type::I32);
                let l = self.lower_expr(st, left);
                let r = self.lower_expr(st, right);
                st.push(
                    expr.span,
                    InstKind::Binary {
                        op: lower_binop(*op),
                        ty,
                        left: l,
                        right: r,
                    },
                )
                .into()
            }
            ExprKind::StringLit(_) | ExprKind::Field { .. } | ExprKind::Range(_) => {
                self.errors.push(EmitError::new(
                    codes::EMIT_UNSUPPORTED,
                    "expression is not supported by the emitter",
                    expr.span,
                ));
                Operand::ConstI32(0)
            }
        }
    }

    /// IR type of a local, or an error for types outside the emitted subset.
    fn local_type(&mut self, ty: TypeId, span: Span) -> Option<Type> {
        if let Some(t) = self.value_type(ty) {
            return Some(t);
        }
        if !self.ctx.types.is_unknown(ty) {
            self.errors.push(
                EmitError::new(
                    codes::EMIT_UNSUPPORTED,
                    format!(
                        "locals of type `{}` are not supported by the emitter",
                        self.ctx.types.display(ty)
                    ),
                    span,
                )
                .with_help("only `int` and `bool` locals can be lowered"),
            );
        }
        None
    }

    fn value_type(&self, ty: TypeId) -> Option<Type> {
        match self.ctx.types.kind(self.ctx.types.deref(ty)) {
            TypeKind::Builtin(keel_core::Builtin::Int) => Some(Type::I32),
            TypeKind::Builtin(keel_core::Builtin::Bool) => Some(Type::I1),
            _ => None,
        }
    }
}

impl From<ValueId> for Operand {
    fn from(v: ValueId) -> Self {
        Operand::Value(v)
    }
}

/// `main` returns `int 0`; every other function is `void`.
fn return_type(function: &str) -> Type {
    if function == "main" { Type::I32 } else { Type::Void }
}

fn zero(ty: Type) -> Operand {
    match ty {
        Type::I1 => Operand::ConstI1(false),
        _ => Operand::ConstI32(0),
    }
}

fn lower_binop(op: AstBinOp) -> BinOp {
    match op {
        AstBinOp::Add => BinOp::Add,
        AstBinOp::Sub => BinOp::Sub,
        AstBinOp::Mul => BinOp::Mul,
        AstBinOp::Div => BinOp::SDiv,
        AstBinOp::Rem => BinOp::SRem,
        AstBinOp::Eq => BinOp::Eq,
        AstBinOp::Ne => BinOp::Ne,
        AstBinOp::Lt => BinOp::Slt,
        AstBinOp::Gt => BinOp::Sgt,
        AstBinOp::Le => BinOp::Sle,
        AstBinOp::Ge => BinOp::Sge,
        AstBinOp::And => BinOp::And,
    }
}
