#![forbid(unsafe_code)]

mod context;
mod error;
mod raii;
mod sema;
mod symbols;
mod types;

use keel_ast::{Program, SourceFile};
use keel_diagnostics::Diagnostics;

pub use context::{ClassInfo, Context, CtorState, FieldInfo, FunctionInfo};
pub use error::SemanticError;
pub use raii::{
    analyze, CleanedProgram, CleanupReport, DeferEffect, ExitCleanup, ExitKind, ScopeDestructorTracker,
    ScopeKind,
};
pub use sema::{Checker, PRINT};
pub use symbols::{Scope, ScopeStack, Symbol, SymbolId, SymbolKind, SymbolTable};
pub use types::{Builtin, TypeId, TypeKind, TypeTable};

/// Resolve names and assign types across `program`, reporting to `diags`.
pub fn contextualize(program: &Program, file: &SourceFile, diags: &mut Diagnostics) -> Context {
    let mut checker = Checker::new();
    checker.check_program(program);
    let (ctx, errors) = checker.finish();
    for err in errors {
        diags.push(err.into_layer_error(file));
    }
    ctx
}
