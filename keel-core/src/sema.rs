#![forbid(unsafe_code)]

use std::collections::HashMap;

use keel_ast::{
    BinOp, Block, CallExpr, ClassDef, CtorBody, CtorKind, Expr, ExprKind, ForStmt, Ident, NodeId, Program,
    Span, Stmt, TypeModifier, TypeName, TypeRef, VarDecl,
};
use keel_diagnostics::codes;

use crate::context::{ClassInfo, Context, CtorState, FieldInfo, FunctionInfo};
use crate::error::SemanticError;
use crate::symbols::{ScopeStack, Symbol, SymbolId, SymbolKind};
use crate::types::{TypeId, TypeKind, TypeTable};

/// Name of the built-in output routine.
pub const PRINT: &str = "print";

const INT_MAX: u64 = i32::MAX as u64;

/// Walks a parsed program, resolving names and assigning types.
///
/// Never stops at the first problem: every error is recorded and checking
/// continues with `<unknown>` standing in for whatever could not be typed.
pub struct Checker {
    ctx: Context,
    scopes: ScopeStack,
    errors: Vec<SemanticError>,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker {
    pub fn new() -> Self {
        Self {
            ctx: Context::default(),
            scopes: ScopeStack::default(),
            errors: Vec::new(),
        }
    }

    pub fn finish(self) -> (Context, Vec<SemanticError>) {
        (self.ctx, self.errors)
    }

    pub fn check_program(&mut self, program: &Program) {
        // Classes are registered before anything refers to them.
        for class in &program.classes {
            self.register_class(class);
        }
        for class in &program.classes {
            self.define_class_members(class);
        }

        for func in &program.functions {
            if func.name.node == PRINT {
                self.errors.push(SemanticError::error(
                    codes::SEMA_DUPLICATE_FUNCTION,
                    format!("`{PRINT}` is a builtin function and cannot be redefined"),
                    func.name.span,
                ));
                continue;
            }
            if self.ctx.functions.contains_key(&func.name.node) {
                self.errors.push(SemanticError::error(
                    codes::SEMA_DUPLICATE_FUNCTION,
                    format!("function `{}` is defined more than once", func.name.node),
                    func.name.span,
                ));
                continue;
            }
            let ty = self.ctx.types.function(Vec::new(), TypeTable::VOID);
            self.ctx.functions.insert(
                func.name.node.clone(),
                FunctionInfo {
                    name: func.name.node.clone(),
                    ty,
                    decl: func.id,
                    span: func.span,
                },
            );
        }

        for class in &program.classes {
            for ctor in &class.ctors {
                if let CtorBody::Body(body) = &ctor.body {
                    self.check_block(body, None);
                }
            }
        }
        for func in &program.functions {
            log::trace!("checking function `{}`", func.name.node);
            self.check_block(&func.body, None);
        }

        log::debug!(
            "semantic pass: {} symbol(s), {} typed expression(s), {} error(s)",
            self.ctx.symbols.len(),
            self.ctx.expr_types.len(),
            self.errors.len()
        );
    }

    fn register_class(&mut self, class: &ClassDef) {
        let name = &class.name.node;
        if self.ctx.classes.contains_key(name) {
            self.errors.push(SemanticError::error(
                codes::SEMA_DUPLICATE_CLASS,
                format!("class `{name}` is defined more than once"),
                class.name.span,
            ));
            return;
        }
        let ty = self.ctx.types.class(name);
        self.ctx.classes.insert(
            name.clone(),
            ClassInfo {
                name: name.clone(),
                ty,
                decl: class.id,
                span: class.span,
                fields: Vec::new(),
                ctors: HashMap::new(),
            },
        );
    }

    fn define_class_members(&mut self, class: &ClassDef) {
        // Duplicates were reported at registration; only the first definition counts.
        if self.ctx.classes.get(&class.name.node).map(|c| c.decl) != Some(class.id) {
            return;
        }

        let mut fields: Vec<FieldInfo> = Vec::new();
        for field in &class.fields {
            let ty = self.resolve_type_ref(&field.ty);
            if ty == TypeTable::VOID {
                self.errors.push(SemanticError::error(
                    codes::SEMA_VOID_VARIABLE,
                    format!("field `{}` cannot have type `void`", field.name.node),
                    field.ty.span,
                ));
            }
            if fields.iter().any(|f| f.name == field.name.node) {
                self.errors.push(SemanticError::error(
                    codes::SEMA_REDECLARED,
                    format!("field `{}` is declared more than once", field.name.node),
                    field.name.span,
                ));
                continue;
            }
            fields.push(FieldInfo {
                name: field.name.node.clone(),
                ty,
            });
        }

        let mut ctors = HashMap::new();
        for ctor in &class.ctors {
            if ctors.insert(ctor.kind, CtorState::from(&ctor.body)).is_some() {
                self.errors.push(SemanticError::error(
                    codes::SEMA_DUPLICATE_CTOR,
                    format!(
                        "{} of `{}` is declared more than once",
                        ctor.kind.describe(),
                        class.name.node
                    ),
                    ctor.span,
                ));
            }
        }

        if let Some(info) = self.ctx.classes.get_mut(&class.name.node) {
            info.fields = fields;
            info.ctors = ctors;
        }
    }

    fn check_block(&mut self, block: &Block, loop_var: Option<&ForStmt>) {
        self.scopes.push(block.id);
        self.ctx.scope_locals.insert(block.id, Vec::new());

        if let Some(for_stmt) = loop_var {
            self.declare(
                &for_stmt.var,
                TypeTable::INT,
                SymbolKind::LoopVar,
                for_stmt.id,
                false,
                true,
            );
        }

        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }

        if let Some(scope) = self.scopes.pop() {
            for id in scope.symbols() {
                let Some(sym) = self.ctx.symbols.get(id) else {
                    continue;
                };
                if sym.used || sym.kind == SymbolKind::LoopVar || sym.name.starts_with('_') {
                    continue;
                }
                self.errors.push(
                    SemanticError::warning(
                        codes::SEMA_UNUSED_LOCAL,
                        format!("unused local `{}`", sym.name),
                        sym.span,
                    )
                    .with_help(format!("prefix it with an underscore: `_{}`", sym.name)),
                );
            }
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.check_var_decl(decl),
            Stmt::Assign(assign) => {
                // A plain variable on the left is written, not read.
                let target_ty = match assign.target.as_var() {
                    Some(name) => {
                        let ty = self.resolve_var(assign.target.id, name);
                        self.ctx.expr_types.insert(assign.target.id, ty);
                        ty
                    }
                    None => self.check_expr(&assign.target),
                };
                let value_ty = self.check_expr(&assign.expr);
                if !assign.target.is_lvalue() {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_NOT_LVALUE,
                        "left-hand side of assignment is not assignable",
                        assign.target.span,
                    ));
                    return;
                }
                if let Some(name) = assign.target.as_var() {
                    let sym = self.scopes.lookup(&name.node);
                    if let Some(sym) = sym.and_then(|id| self.ctx.symbols.get_mut(id)) {
                        if sym.is_const {
                            self.errors.push(SemanticError::error(
                                codes::SEMA_NOT_LVALUE,
                                format!("cannot assign to const `{}`", name.node),
                                name.span,
                            ));
                            return;
                        }
                        sym.initialized = true;
                    }
                }
                let expected = self.ctx.types.deref(target_ty);
                self.check_assignable(expected, value_ty, assign.expr.span);
            }
            Stmt::Call(call) => self.check_call(&call.call, false),
            Stmt::Block(block) => self.check_block(block, None),
            Stmt::If(s) => {
                self.check_condition(&s.cond, "if");
                self.check_block(&s.then_block, None);
                if let Some(else_block) = &s.else_block {
                    self.check_block(else_block, None);
                }
            }
            Stmt::While(s) => {
                self.check_condition(&s.cond, "while");
                self.check_block(&s.body, None);
            }
            Stmt::For(s) => {
                let iter_ty = self.check_expr(&s.iter);
                let range_int = self.ctx.types.sequence(TypeTable::INT);
                if iter_ty != range_int && !self.ctx.types.is_unknown(iter_ty) {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_TYPE_MISMATCH,
                        format!(
                            "`for` expects `range<int>`, found `{}`",
                            self.ctx.types.display(iter_ty)
                        ),
                        s.iter.span,
                    ));
                }
                self.check_block(&s.body, Some(s));
            }
            Stmt::Return(r) => {
                if let Some(value) = &r.value {
                    self.check_expr(value);
                    self.errors.push(
                        SemanticError::error(
                            codes::SEMA_RETURN_VALUE,
                            "functions do not return values",
                            value.span,
                        )
                        .with_help("use `return;`"),
                    );
                }
            }
            Stmt::Defer(d) => self.check_call(&d.call, true),
            Stmt::Cleanup(_) => {}
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl) {
        let init_ty = decl.init.as_ref().map(|e| self.check_expr(e));

        let ty = if decl.ty.base == TypeName::Auto {
            if !decl.ty.modifiers.is_empty() {
                self.errors.push(SemanticError::error(
                    codes::SEMA_UNKNOWN_TYPE,
                    "`auto` cannot be combined with `*` or `&`",
                    decl.ty.span,
                ));
                TypeTable::UNKNOWN
            } else if let Some(t) = init_ty {
                self.ctx.types.deref(t)
            } else {
                self.errors.push(SemanticError::error(
                    codes::SEMA_UNKNOWN_TYPE,
                    format!("cannot infer the type of `{}` without an initializer", decl.name.node),
                    decl.ty.span,
                ));
                TypeTable::UNKNOWN
            }
        } else {
            self.resolve_type_ref(&decl.ty)
        };

        match self.ctx.types.kind(ty) {
            TypeKind::Builtin(crate::types::Builtin::Void) => {
                self.errors.push(SemanticError::error(
                    codes::SEMA_VOID_VARIABLE,
                    format!("variable `{}` cannot have type `void`", decl.name.node),
                    decl.ty.span,
                ));
            }
            TypeKind::Str | TypeKind::Sequence(_) => {
                self.errors.push(
                    SemanticError::error(
                        codes::SEMA_TYPE_MISMATCH,
                        format!(
                            "variable `{}` cannot hold a value of type `{}`",
                            decl.name.node,
                            self.ctx.types.display(ty)
                        ),
                        decl.span,
                    )
                    .with_help("pass string literals to `print` and ranges to `for` directly"),
                );
            }
            TypeKind::Reference(_) => match &decl.init {
                None => self.errors.push(SemanticError::error(
                    codes::SEMA_TYPE_MISMATCH,
                    format!("reference `{}` must be initialized", decl.name.node),
                    decl.span,
                )),
                Some(init) if !init.is_lvalue() => self.errors.push(SemanticError::error(
                    codes::SEMA_NOT_LVALUE,
                    format!("reference `{}` must bind to an assignable value", decl.name.node),
                    init.span,
                )),
                Some(_) => {}
            },
            TypeKind::Class(name) => {
                let built = if decl.init.is_some() {
                    CtorKind::Copy
                } else {
                    CtorKind::Default
                };
                if let Some(class) = self.ctx.classes.get(name) {
                    for kind in [built, CtorKind::Destructor] {
                        if !class.has(kind) {
                            self.errors.push(
                                SemanticError::error(
                                    codes::SEMA_DELETED_MEMBER,
                                    format!(
                                        "`{}` needs the {} of `{name}`, which is deleted",
                                        decl.name.node,
                                        kind.describe()
                                    ),
                                    decl.span,
                                )
                                .with_help(format!("remove `= delete` from the {}", kind.describe())),
                            );
                        }
                    }
                }
            }
            _ => {}
        }

        if let (Some(init), Some(init_ty)) = (&decl.init, init_ty) {
            if decl.ty.base != TypeName::Auto {
                let expected = self.ctx.types.deref(ty);
                self.check_assignable(expected, init_ty, init.span);
            }
        }

        self.declare(
            &decl.name,
            ty,
            SymbolKind::Local,
            decl.id,
            decl.ty.is_const,
            decl.init.is_some() || self.ctx.types.class_name(ty).is_some(),
        );
    }

    fn check_condition(&mut self, cond: &Expr, construct: &str) {
        let ty = self.check_expr(cond);
        let ty = self.ctx.types.deref(ty);
        if ty != TypeTable::BOOL && !self.ctx.types.is_unknown(ty) {
            self.errors.push(SemanticError::error(
                codes::SEMA_TYPE_MISMATCH,
                format!(
                    "`{construct}` condition must be `bool`, found `{}`",
                    self.ctx.types.display(ty)
                ),
                cond.span,
            ));
        }
    }

    fn check_call(&mut self, call: &CallExpr, deferred: bool) {
        let arg_types: Vec<TypeId> = call.args.iter().map(|a| self.check_expr(a)).collect();
        self.ctx.expr_types.insert(call.id, TypeTable::VOID);
        let callee = &call.callee.node;

        if callee == PRINT {
            if call.args.len() != 1 {
                self.errors.push(SemanticError::error(
                    codes::SEMA_ARITY,
                    format!("`{PRINT}` takes exactly one argument, found {}", call.args.len()),
                    call.span,
                ));
                return;
            }
            let ty = self.ctx.types.deref(arg_types[0]);
            let printable = [TypeTable::INT, TypeTable::BOOL, TypeTable::STR, TypeTable::UNKNOWN];
            if !printable.contains(&ty) {
                self.errors.push(SemanticError::error(
                    codes::SEMA_TYPE_MISMATCH,
                    format!("cannot print a value of type `{}`", self.ctx.types.display(ty)),
                    call.args[0].span,
                ));
            }
            return;
        }

        if self.ctx.functions.contains_key(callee) {
            if !call.args.is_empty() {
                self.errors.push(SemanticError::error(
                    codes::SEMA_ARITY,
                    format!("`{callee}` takes no arguments, found {}", call.args.len()),
                    call.span,
                ));
            }
            return;
        }

        if deferred {
            // External cleanup routine supplied by the runtime.
            log::trace!("`{callee}` treated as an external cleanup routine");
            for (arg, ty) in call.args.iter().zip(&arg_types) {
                if matches!(self.ctx.types.kind(*ty), TypeKind::Sequence(_)) {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_TYPE_MISMATCH,
                        "a range cannot be passed to a cleanup routine",
                        arg.span,
                    ));
                }
            }
            return;
        }

        self.errors.push(
            SemanticError::error(
                codes::SEMA_UNKNOWN_FUNCTION,
                format!("call to unknown function `{callee}`"),
                call.callee.span,
            )
            .with_help("runtime cleanup routines may only be called from `defer`"),
        );
    }

    fn check_assignable(&mut self, expected: TypeId, actual: TypeId, span: Span) {
        let types = &self.ctx.types;
        if types.is_unknown(expected) || types.is_unknown(actual) {
            return;
        }
        if types.deref(expected) == types.deref(actual) {
            return;
        }
        self.errors.push(SemanticError::error(
            codes::SEMA_TYPE_MISMATCH,
            format!(
                "mismatched types: expected `{}`, found `{}`",
                types.display(expected),
                types.display(actual)
            ),
            span,
        ));
    }

    fn check_expr(&mut self, expr: &Expr) -> TypeId {
        let ty = self.infer_expr(expr);
        self.ctx.expr_types.insert(expr.id, ty);
        ty
    }

    fn infer_expr(&mut self, expr: &Expr) -> TypeId {
        match &expr.kind {
            ExprKind::IntLit(n) => {
                if *n > INT_MAX {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_INT_OUT_OF_RANGE,
                        format!("integer literal `{n}` does not fit in `int`"),
                        expr.span,
                    ));
                }
                TypeTable::INT
            }
            ExprKind::BoolLit(_) => TypeTable::BOOL,
            ExprKind::StringLit(_) => TypeTable::STR,
            ExprKind::Var(name) => self.read_var(expr.id, name),
            ExprKind::Binary {
                left, op, right, ..
            } => {
                let lt = self.check_expr(left);
                let rt = self.check_expr(right);
                let lt = self.ctx.types.deref(lt);
                let rt = self.ctx.types.deref(rt);
                self.infer_binary(*op, (left, lt), (right, rt))
            }
            ExprKind::Field { base, field } => {
                let bt = self.check_expr(base);
                if self.ctx.types.is_unknown(bt) {
                    return TypeTable::UNKNOWN;
                }
                let Some(class_name) = self.ctx.types.class_name(bt).map(str::to_string) else {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_FIELD_ON_NON_CLASS,
                        format!(
                            "field access `.{}` on a value of type `{}`",
                            field.node,
                            self.ctx.types.display(bt)
                        ),
                        field.span,
                    ));
                    return TypeTable::UNKNOWN;
                };
                let found = self
                    .ctx
                    .classes
                    .get(&class_name)
                    .and_then(|c| c.field(&field.node))
                    .map(|f| f.ty);
                match found {
                    Some(ty) => ty,
                    None => {
                        self.errors.push(SemanticError::error(
                            codes::SEMA_UNKNOWN_FIELD,
                            format!("class `{class_name}` has no field `{}`", field.node),
                            field.span,
                        ));
                        TypeTable::UNKNOWN
                    }
                }
            }
            ExprKind::Range(bound) => {
                let bt = self.check_expr(bound);
                let bt = self.ctx.types.deref(bt);
                if bt != TypeTable::INT && !self.ctx.types.is_unknown(bt) {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_TYPE_MISMATCH,
                        format!("`range` expects `int`, found `{}`", self.ctx.types.display(bt)),
                        bound.span,
                    ));
                }
                self.ctx.types.sequence(TypeTable::INT)
            }
        }
    }

    fn infer_binary(&mut self, op: BinOp, left: (&Expr, TypeId), right: (&Expr, TypeId)) -> TypeId {
        let (want, result) = if op.is_arithmetic() {
            (Some(TypeTable::INT), TypeTable::INT)
        } else if op == BinOp::And {
            (Some(TypeTable::BOOL), TypeTable::BOOL)
        } else if matches!(op, BinOp::Eq | BinOp::Ne) {
            (None, TypeTable::BOOL)
        } else {
            (Some(TypeTable::INT), TypeTable::BOOL)
        };

        match want {
            Some(want) => {
                for (operand, ty) in [left, right] {
                    if ty != want && !self.ctx.types.is_unknown(ty) {
                        self.errors.push(SemanticError::error(
                            codes::SEMA_TYPE_MISMATCH,
                            format!(
                                "operator `{}` expects `{}`, found `{}`",
                                op.symbol(),
                                self.ctx.types.display(want),
                                self.ctx.types.display(ty)
                            ),
                            operand.span,
                        ));
                    }
                }
            }
            None => {
                let (lt, rt) = (left.1, right.1);
                let comparable = [TypeTable::INT, TypeTable::BOOL];
                let unknown = self.ctx.types.is_unknown(lt) || self.ctx.types.is_unknown(rt);
                if !unknown && (lt != rt || !comparable.contains(&lt)) {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_TYPE_MISMATCH,
                        format!(
                            "cannot compare `{}` with `{}`",
                            self.ctx.types.display(lt),
                            self.ctx.types.display(rt)
                        ),
                        keel_ast::join(left.0.span, right.0.span),
                    ));
                }
            }
        }
        result
    }

    fn resolve_var(&mut self, expr: NodeId, name: &Ident) -> TypeId {
        let Some(id) = self.scopes.lookup(&name.node) else {
            self.errors.push(SemanticError::error(
                codes::SEMA_UNDECLARED,
                format!("use of undeclared identifier `{}`", name.node),
                name.span,
            ));
            return TypeTable::UNKNOWN;
        };
        self.ctx.resolutions.insert(expr, id);
        match self.ctx.symbols.get_mut(id) {
            Some(sym) => {
                sym.used = true;
                sym.ty
            }
            None => TypeTable::UNKNOWN,
        }
    }

    fn read_var(&mut self, expr: NodeId, name: &Ident) -> TypeId {
        let ty = self.resolve_var(expr, name);
        let unset = self
            .ctx
            .resolutions
            .get(&expr)
            .and_then(|id| self.ctx.symbols.get(*id))
            .is_some_and(|sym| !sym.initialized);
        if unset {
            self.errors.push(
                SemanticError::warning(
                    codes::SEMA_UNINITIALIZED_READ,
                    format!("`{}` is read before anything is stored in it", name.node),
                    name.span,
                )
                .with_help("give it an initializer; the emitter stores zero otherwise"),
            );
        }
        ty
    }

    fn resolve_type_ref(&mut self, tr: &TypeRef) -> TypeId {
        let mut ty = match &tr.base {
            TypeName::Int => TypeTable::INT,
            TypeName::Bool => TypeTable::BOOL,
            TypeName::Void => TypeTable::VOID,
            TypeName::Auto => TypeTable::UNKNOWN,
            TypeName::Named(name) => match self.ctx.classes.get(&name.node) {
                Some(info) => info.ty,
                None => {
                    self.errors.push(SemanticError::error(
                        codes::SEMA_UNKNOWN_TYPE,
                        format!("unknown type `{}`", name.node),
                        name.span,
                    ));
                    return TypeTable::UNKNOWN;
                }
            },
        };
        for m in &tr.modifiers {
            ty = match m {
                TypeModifier::Pointer => self.ctx.types.pointer(ty),
                TypeModifier::Reference => self.ctx.types.reference(ty),
            };
        }
        ty
    }

    fn declare(
        &mut self,
        name: &Ident,
        ty: TypeId,
        kind: SymbolKind,
        decl: NodeId,
        is_const: bool,
        initialized: bool,
    ) -> SymbolId {
        let id = self.ctx.symbols.add(Symbol {
            name: name.node.clone(),
            ty,
            kind,
            initialized,
            is_const,
            decl,
            span: name.span,
            used: false,
        });
        self.ctx.decl_symbols.insert(decl, id);

        let Some(scope) = self.scopes.current_mut() else {
            return id;
        };
        let block = scope.block;
        if scope.insert(&name.node, id).is_err() {
            self.errors.push(SemanticError::error(
                codes::SEMA_REDECLARED,
                format!("`{}` is already declared in this scope", name.node),
                name.span,
            ));
            return id;
        }
        self.ctx.scope_locals.entry(block).or_default().push(id);
        id
    }
}
