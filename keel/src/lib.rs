#![forbid(unsafe_code)]

//! Driver for the Keel front end: loads a source file, runs
//! lex → parse → sema → raii → emit over one shared diagnostic sink and maps
//! the result to a process exit status.

mod config;
mod loader;
mod session;

pub use config::{
    CONFIG_FILE, CompileOptions, ConfigError, DiagnosticsConfig, EmitConfig, KeelConfig, StopAfter,
};
pub use loader::load_source;
pub use session::{CompileOutcome, ExitStatus, SessionError, compile, compile_str};
