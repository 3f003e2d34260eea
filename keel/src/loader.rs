#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use keel_ast::{FileId, FileTable, span};
use keel_diagnostics::{Diagnostics, Layer, LayerError, codes};

/// Read `path` into `files`.
///
/// Failures are recorded as fatal loader diagnostics and yield `None`. A file
/// that is not UTF-8 is still registered (lossily decoded) so the diagnostic
/// can point at the first bad byte.
pub fn load_source(path: &Path, files: &mut FileTable, diags: &mut Diagnostics) -> Option<FileId> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            diags.push(
                LayerError::fatal(
                    Layer::Loader,
                    codes::LOAD_IO,
                    format!("cannot read `{}`", path.display()),
                )
                .with_detail(err.to_string()),
            );
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => {
            log::debug!("loaded {} ({} bytes)", path.display(), text.len());
            Some(files.add(path, text))
        }
        Err(err) => {
            let offset = err.utf8_error().valid_up_to();
            let text = String::from_utf8_lossy(err.as_bytes()).into_owned();
            let id = files.add(path, text);
            let mut diag = LayerError::fatal(
                Layer::Loader,
                codes::LOAD_NOT_UTF8,
                format!("`{}` is not valid UTF-8", path.display()),
            )
            .with_detail(format!("first invalid byte at offset {offset}"));
            if let Some(file) = files.get(id) {
                diag = diag.at(file, span(offset, 1));
            }
            diags.push(diag);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_diagnostics::Severity;

    #[test]
    fn missing_file_is_fatal() {
        let mut files = FileTable::new();
        let mut diags = Diagnostics::new();
        let id = load_source(Path::new("does/not/exist.kl"), &mut files, &mut diags);
        assert!(id.is_none());
        assert_eq!(diags.len(), 1);
        let err = diags.iter().next().unwrap();
        assert_eq!(err.code, codes::LOAD_IO);
        assert_eq!(err.severity, Severity::Fatal);
        assert_eq!(err.layer, Layer::Loader);
    }

    #[test]
    fn invalid_utf8_points_at_the_bad_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.kl");
        fs::write(&path, b"fn main() {\n  \xff\n}\n").unwrap();

        let mut files = FileTable::new();
        let mut diags = Diagnostics::new();
        assert!(load_source(&path, &mut files, &mut diags).is_none());
        let err = diags.with_code(codes::LOAD_NOT_UTF8).next().unwrap();
        let pos = err.primary_position().unwrap();
        assert_eq!((pos.line, pos.column), (2, 3));
    }

    #[test]
    fn loads_utf8_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.kl");
        fs::write(&path, "fn main() {}\n").unwrap();

        let mut files = FileTable::new();
        let mut diags = Diagnostics::new();
        let id = load_source(&path, &mut files, &mut diags).unwrap();
        assert!(diags.is_empty());
        assert_eq!(files.get(id).unwrap().content(), "fn main() {}\n");
    }
}
