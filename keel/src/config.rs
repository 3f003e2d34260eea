#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::fs;
use std::path::{Path, PathBuf};

use keel_core::PRINT;
use keel_ir::EmitOptions;
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

/// File name looked up next to the compiled source.
pub const CONFIG_FILE: &str = "keel.toml";

/// Last pass to run before the pipeline stops (`--stop-after`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum StopAfter {
    Lex,
    Parse,
    Sema,
    Raii,
}

/// Everything a single compilation needs to know besides the source itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    pub stop_after: Option<StopAfter>,
    /// Source lines shown above and below a diagnostic.
    pub context_lines: usize,
    /// Treat every warning as an error.
    pub deny_warnings: bool,
    pub print_symbol: String,
    /// `None` selects the host triple.
    pub target_triple: Option<String>,
    /// Where to write the textual IR, if anywhere.
    pub emit_ir: Option<PathBuf>,
    /// Where to write the program (after cleanup insertion when RAII ran) in
    /// canonical source form.
    pub emit_ast: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::from_config(&KeelConfig::default())
    }
}

impl CompileOptions {
    pub fn from_config(config: &KeelConfig) -> Self {
        Self {
            stop_after: None,
            context_lines: config.diagnostics.context_lines,
            deny_warnings: config.diagnostics.deny_warnings,
            print_symbol: config.emit.print_symbol.clone(),
            target_triple: config.emit.target_triple.clone(),
            emit_ir: None,
            emit_ast: None,
        }
    }

    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            print_symbol: self.print_symbol.clone(),
            target_triple: self.target_triple.clone(),
        }
    }

    /// Whether the pass after `stage` should still run.
    pub fn runs_past(&self, stage: StopAfter) -> bool {
        self.stop_after.is_none_or(|last| last > stage)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read `{}`", path.display())]
    #[diagnostic(code(keel::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in `{}`: {message}", path.display())]
    #[diagnostic(code(keel::config::parse))]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration in `{}`: {message}", path.display())]
    #[diagnostic(code(keel::config::value))]
    Value {
        path: PathBuf,
        message: String,
        #[help]
        help: String,
    },
}

/// Contents of a `keel.toml` file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct KeelConfig {
    pub diagnostics: DiagnosticsConfig,
    pub emit: EmitConfig,
}

/// `[diagnostics]`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default)]
    pub deny_warnings: bool,
}

/// `[emit]`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EmitConfig {
    #[serde(default = "default_print_symbol")]
    pub print_symbol: String,

    #[serde(default)]
    pub target_triple: Option<String>,
}

fn default_context_lines() -> usize {
    2
}

fn default_print_symbol() -> String {
    PRINT.to_string()
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            deny_warnings: false,
        }
    }
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            print_symbol: default_print_symbol(),
            target_triple: None,
        }
    }
}

impl KeelConfig {
    /// Parse `text`; `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: KeelConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load the `keel.toml` that sits next to `source`, if there is one.
    pub fn discover(source: &Path) -> Result<Option<Self>, ConfigError> {
        let dir = match source.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let candidate = dir.join(CONFIG_FILE);
        if !candidate.is_file() {
            return Ok(None);
        }
        log::debug!("using configuration {}", candidate.display());
        Self::load(&candidate).map(Some)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let symbol = &self.emit.print_symbol;
        let valid = symbol
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$');
        if !valid {
            return Err(ConfigError::Value {
                path: path.to_path_buf(),
                message: format!("`{symbol}` is not a usable symbol name"),
                help: "print-symbol must start with a letter or `_`".to_string(),
            });
        }
        if let Some(triple) = &self.emit.target_triple {
            if triple.trim().is_empty() {
                return Err(ConfigError::Value {
                    path: path.to_path_buf(),
                    message: "target-triple is empty".to_string(),
                    help: "remove the key to target the host".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<KeelConfig, ConfigError> {
        KeelConfig::parse(text, Path::new("keel.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg, KeelConfig::default());
        assert_eq!(cfg.diagnostics.context_lines, 2);
        assert_eq!(cfg.emit.print_symbol, "print");
        assert_eq!(cfg.emit.target_triple, None);
    }

    #[test]
    fn reads_every_key() {
        let cfg = parse(
            r#"
[diagnostics]
context-lines = 0
deny-warnings = true

[emit]
print-symbol = "printf"
target-triple = "x86_64-unknown-linux-gnu"
"#,
        )
        .unwrap();
        assert_eq!(cfg.diagnostics.context_lines, 0);
        assert!(cfg.diagnostics.deny_warnings);
        assert_eq!(cfg.emit.print_symbol, "printf");
        assert_eq!(cfg.emit.target_triple.as_deref(), Some("x86_64-unknown-linux-gnu"));

        let opts = CompileOptions::from_config(&cfg);
        assert_eq!(opts.context_lines, 0);
        assert!(opts.deny_warnings);
        assert_eq!(opts.emit_options().print_symbol, "printf");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse("[emit]\nprint = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err:?}");
    }

    #[test]
    fn bad_symbol_is_rejected() {
        let err = parse("[emit]\nprint-symbol = \"9lives\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Value { .. }), "{err:?}");
    }

    #[test]
    fn stop_after_orders_passes() {
        let mut opts = CompileOptions::default();
        assert!(opts.runs_past(StopAfter::Raii));
        opts.stop_after = Some(StopAfter::Parse);
        assert!(opts.runs_past(StopAfter::Lex));
        assert!(!opts.runs_past(StopAfter::Parse));
        assert!(!opts.runs_past(StopAfter::Sema));
    }
}
