#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use miette::NamedSource;

use keel::{CompileOptions, CompileOutcome, ExitStatus, KeelConfig, StopAfter};

#[derive(Parser, Debug)]
#[command(name = "keel", version, about = "Keel compiler front end")]
struct Cli {
    /// Source file to compile.
    path: PathBuf,

    /// Write the textual IR to this path.
    #[arg(long, value_name = "PATH")]
    emit_ir: Option<PathBuf>,

    /// Write the program, with inserted cleanups once the RAII pass ran, to this path.
    #[arg(long, value_name = "PATH")]
    emit_ast: Option<PathBuf>,

    /// Stop after the given pass.
    #[arg(long, value_enum)]
    stop_after: Option<StopAfter>,

    /// Source lines shown around each diagnostic.
    #[arg(long, value_name = "N")]
    context_lines: Option<usize>,

    /// Treat warnings as errors.
    #[arg(long)]
    deny_warnings: bool,

    #[arg(long, value_enum, default_value_t = DiagnosticStyle::Plain)]
    diagnostic_style: DiagnosticStyle,

    /// Configuration file (defaults to `keel.toml` next to the source).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DiagnosticStyle {
    /// `<file>:<line>:<col>: <severity>: [<code>] <message>` plus source context.
    Plain,
    /// miette's graphical report.
    Fancy,
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(status) => ExitCode::from(status.code()),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(ExitStatus::Io.code())
        }
    }
}

fn run(cli: &Cli) -> miette::Result<ExitStatus> {
    let config = match &cli.config {
        Some(path) => KeelConfig::load(path)?,
        None => KeelConfig::discover(&cli.path)?.unwrap_or_default(),
    };

    let mut opts = CompileOptions::from_config(&config);
    opts.stop_after = cli.stop_after;
    opts.emit_ir = cli.emit_ir.clone();
    opts.emit_ast = cli.emit_ast.clone();
    if let Some(n) = cli.context_lines {
        opts.context_lines = n;
    }
    if cli.deny_warnings {
        opts.deny_warnings = true;
    }

    let outcome = keel::compile(&cli.path, &opts);
    report(&outcome, &opts, cli.diagnostic_style);
    outcome.write_artifacts(&opts)?;
    Ok(outcome.status)
}

fn report(outcome: &CompileOutcome, opts: &CompileOptions, style: DiagnosticStyle) {
    match style {
        DiagnosticStyle::Plain => eprint!("{}", outcome.render(opts.context_lines)),
        DiagnosticStyle::Fancy => {
            for err in outcome.diagnostics.sorted() {
                let source = err
                    .primary_position()
                    .and_then(|pos| outcome.files.get(pos.file));
                let report = miette::Report::new(err.clone());
                let report = match source {
                    Some(file) => report.with_source_code(NamedSource::new(
                        file.path().display().to_string(),
                        file.content().to_string(),
                    )),
                    None => report,
                };
                eprintln!("{report:?}");
            }
        }
    }
}
