#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use keel_ast::{FileId, FileTable, Program};
use keel_core::CleanedProgram;
use keel_diagnostics::{Diagnostics, Layer, codes};
use keel_ir::ModuleIR;
use miette::Diagnostic;
use thiserror::Error;

use crate::config::{CompileOptions, StopAfter};
use crate::loader::load_source;

/// Process exit status of a compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// At least one blocking diagnostic.
    Failed,
    /// The source could not be read.
    Io,
    /// The emitted IR did not verify.
    Verification,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failed => 1,
            ExitStatus::Io => 2,
            ExitStatus::Verification => 3,
        }
    }

    fn of(diags: &Diagnostics) -> Self {
        if diags.iter().any(|d| d.layer == Layer::Loader && d.is_blocking()) {
            ExitStatus::Io
        } else if diags.with_code(codes::EMIT_VERIFY).next().is_some() {
            ExitStatus::Verification
        } else if diags.has_blocking() {
            ExitStatus::Failed
        } else {
            ExitStatus::Success
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("cannot write IR to `{}`", path.display())]
    #[diagnostic(code(keel::session::emit_ir))]
    WriteIr {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write AST to `{}`", path.display())]
    #[diagnostic(code(keel::session::emit_ast))]
    WriteAst {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything one compilation produced.
#[derive(Debug)]
pub struct CompileOutcome {
    pub files: FileTable,
    pub diagnostics: Diagnostics,
    pub program: Option<Program>,
    pub cleaned: Option<CleanedProgram>,
    pub module: Option<ModuleIR>,
    pub status: ExitStatus,
}

impl CompileOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == ExitStatus::Success
    }

    /// Textual IR, when the emitter ran to completion.
    pub fn ir_text(&self) -> Option<String> {
        self.module.as_ref().map(keel_ir::print_module)
    }

    /// The most processed program in canonical source form: cleanup
    /// statements included once the RAII pass ran.
    pub fn ast_text(&self) -> Option<String> {
        match (&self.cleaned, &self.program) {
            (Some(cleaned), _) => Some(keel_parse::format_program(&cleaned.program)),
            (None, Some(program)) => Some(keel_parse::format_program(program)),
            (None, None) => None,
        }
    }

    pub fn render(&self, context_lines: usize) -> String {
        self.diagnostics.render_plain(&self.files, context_lines)
    }

    /// Write the artifacts `opts` asks for. IR is only written when the
    /// emitter produced a module.
    pub fn write_artifacts(&self, opts: &CompileOptions) -> Result<(), SessionError> {
        if let (Some(module), Some(path)) = (&self.module, &opts.emit_ir) {
            write_ir(module, path)?;
        }
        if let (Some(path), Some(text)) = (&opts.emit_ast, self.ast_text()) {
            fs::write(path, text).map_err(|source| SessionError::WriteAst {
                path: path.clone(),
                source,
            })?;
            log::debug!("wrote AST to {}", path.display());
        }
        Ok(())
    }
}

/// Compile the file at `path`. Nothing is written; see
/// [`CompileOutcome::write_artifacts`].
pub fn compile(path: &Path, opts: &CompileOptions) -> CompileOutcome {
    let mut session = Session::new(opts);
    if let Some(id) = load_source(path, &mut session.files, &mut session.diags) {
        session.passes(id);
    }
    session.finish()
}

/// Compile an in-memory buffer registered under `name`.
pub fn compile_str(name: impl Into<PathBuf>, source: &str, opts: &CompileOptions) -> CompileOutcome {
    let mut session = Session::new(opts);
    let id = session.files.add(name, source);
    session.passes(id);
    session.finish()
}

/// One compilation: the diagnostic sink plus the artifacts of each pass.
struct Session<'o> {
    opts: &'o CompileOptions,
    files: FileTable,
    diags: Diagnostics,
    program: Option<Program>,
    cleaned: Option<CleanedProgram>,
    module: Option<ModuleIR>,
}

impl<'o> Session<'o> {
    fn new(opts: &'o CompileOptions) -> Self {
        Self {
            opts,
            files: FileTable::new(),
            diags: Diagnostics::new(),
            program: None,
            cleaned: None,
            module: None,
        }
    }

    fn passes(&mut self, id: FileId) {
        let Some(file) = self.files.get(id) else {
            return;
        };
        let opts = self.opts;
        let diags = &mut self.diags;

        log::debug!("lex: {}", file.path().display());
        let tokens = keel_lex::lex(file, diags);
        if !opts.runs_past(StopAfter::Lex) {
            return;
        }

        log::debug!("parse: {} tokens", tokens.len());
        let program = keel_parse::parse_tokens(file, &tokens, diags);
        if !opts.runs_past(StopAfter::Parse) || diags.has_fatal_from(Layer::Parser) {
            self.program = Some(program);
            return;
        }

        log::debug!(
            "sema: {} function(s), {} class(es)",
            program.functions.len(),
            program.classes.len()
        );
        let ctx = keel_core::contextualize(&program, file, diags);
        if opts.deny_warnings {
            diags.escalate_warnings();
        }
        if !opts.runs_past(StopAfter::Sema) || diags.has_blocking() {
            self.program = Some(program);
            return;
        }

        log::debug!("raii");
        let cleaned = keel_core::analyze(&program, &ctx, file, diags);
        self.program = Some(program);
        let Some(cleaned) = cleaned else {
            return;
        };
        if !opts.runs_past(StopAfter::Raii) || diags.has_blocking() {
            self.cleaned = Some(cleaned);
            return;
        }

        log::debug!("emit");
        self.module = keel_ir::emit(&cleaned, &ctx, file, &opts.emit_options(), diags);
        self.cleaned = Some(cleaned);
    }

    fn finish(mut self) -> CompileOutcome {
        if self.opts.deny_warnings {
            self.diags.escalate_warnings();
        }
        let status = ExitStatus::of(&self.diags);
        log::debug!(
            "finished with {} diagnostic(s), exit {}",
            self.diags.len(),
            status.code()
        );
        CompileOutcome {
            files: self.files,
            diagnostics: self.diags,
            program: self.program,
            cleaned: self.cleaned,
            module: self.module,
            status,
        }
    }
}

fn write_ir(module: &ModuleIR, path: &Path) -> Result<(), SessionError> {
    let wrap = |source| SessionError::WriteIr {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(wrap)?;
    let mut sink = BufWriter::new(file);
    keel_ir::write_ir(module, &mut sink).map_err(wrap)?;
    log::debug!("wrote IR to {}", path.display());
    Ok(())
}
