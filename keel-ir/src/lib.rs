#![forbid(unsafe_code)]

mod error;
pub mod ir;
mod lower;
mod print;
mod verify;

use std::io;

use keel_ast::SourceFile;
use keel_core::{CleanedProgram, Context};
use keel_diagnostics::{codes, Diagnostics, Layer, LayerError};

pub use error::EmitError;
pub use ir::*;
pub use lower::{EmitOptions, Lowerer, MAX_UNROLL};
pub use print::print_module;
pub use verify::{validate_module, VerifyError};

/// Lower `cleaned` to a verified IR module.
///
/// Returns `None` without touching `diags` when earlier passes already
/// reported blocking diagnostics.
pub fn emit(
    cleaned: &CleanedProgram,
    ctx: &Context,
    file: &SourceFile,
    opts: &EmitOptions,
    diags: &mut Diagnostics,
) -> Option<ModuleIR> {
    if diags.has_blocking() {
        log::debug!("emitter skipped: blocking diagnostics present");
        return None;
    }

    let name = file
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "keel".to_string());
    let mut lowerer = Lowerer::new(ctx, opts, &name);
    lowerer.lower_program(&cleaned.program);
    let (module, errors) = lowerer.finish();
    if !errors.is_empty() {
        for err in errors {
            diags.push(err.into_layer_error(file));
        }
        return None;
    }

    if let Err(err) = validate_module(&module) {
        diags.push(
            LayerError::fatal(Layer::Emitter, codes::EMIT_VERIFY, "emitted IR failed verification")
                .with_detail(err.to_string()),
        );
        return None;
    }
    Some(module)
}

/// Write the textual form of `module` to `sink`.
pub fn write_ir(module: &ModuleIR, sink: &mut impl io::Write) -> io::Result<()> {
    sink.write_all(print_module(module).as_bytes())?;
    sink.flush()
}
