#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileId(pub u32);

/// A resolved location inside a loaded file.
///
/// Line and column are 1-based; columns count bytes. The derived ordering is
/// lexicographic over `(file, line, column, offset)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

#[derive(Clone, Debug)]
pub struct SourceFile {
    id: FileId,
    path: PathBuf,
    content: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(id: FileId, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut line_starts: Vec<usize> = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        // Sentinel so every line has an end offset.
        if line_starts.last().copied() != Some(content.len()) {
            line_starts.push(content.len());
        }
        Self {
            id,
            path: path.into(),
            content,
            line_starts,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    pub fn position(&self, offset: usize) -> SourcePosition {
        let offset = offset.min(self.content.len());
        let mut line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        // The end-of-content sentinel is not a line of its own.
        if line_idx > 0 && line_idx + 1 == self.line_starts.len() && !self.content.ends_with('\n') {
            line_idx -= 1;
        }
        let line_start = self.line_starts[line_idx];
        SourcePosition {
            file: self.id,
            line: (line_idx as u32) + 1,
            column: (offset - line_start) as u32 + 1,
            offset,
        }
    }

    /// Text of the 1-based `line`, without its terminator.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)?;
        if start >= self.content.len() && idx > 0 {
            return None;
        }
        let end = self
            .line_starts
            .get(idx + 1)
            .copied()
            .unwrap_or(self.content.len());
        let text = &self.content[start..end];
        let text = text.strip_suffix('\n').unwrap_or(text);
        Some(text.strip_suffix('\r').unwrap_or(text))
    }

    pub fn line_count(&self) -> u32 {
        if self.content.is_empty() {
            return 0;
        }
        let n = self.line_starts.len() - 1;
        n as u32
    }
}

/// Every source buffer loaded for one compilation.
#[derive(Clone, Debug, Default)]
pub struct FileTable {
    files: Vec<SourceFile>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(id, path, content));
        id
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    pub fn path(&self, id: FileId) -> Option<&Path> {
        self.get(id).map(SourceFile::path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content: &str) -> SourceFile {
        SourceFile::new(FileId(0), "t.kl", content)
    }

    #[test]
    fn line_starts_end_with_content_length() {
        let f = file("ab\ncd");
        assert_eq!(f.line_starts(), &[0, 3, 5]);

        let f = file("ab\ncd\n");
        assert_eq!(f.line_starts(), &[0, 3, 6]);

        let f = file("");
        assert_eq!(f.line_starts(), &[0]);
    }

    #[test]
    fn positions_are_one_based() {
        let f = file("fn main() {\n  print(1);\n}");
        let p = f.position(14);
        assert_eq!((p.line, p.column), (2, 3));
        let end = f.position(f.content().len());
        assert_eq!((end.line, end.column), (3, 2));
    }

    #[test]
    fn eof_after_trailing_newline_is_on_a_fresh_line() {
        let f = file("x\n");
        let p = f.position(2);
        assert_eq!((p.line, p.column), (2, 1));
    }

    #[test]
    fn line_text_strips_terminators() {
        let f = file("one\r\ntwo\nthree");
        assert_eq!(f.line_text(1), Some("one"));
        assert_eq!(f.line_text(2), Some("two"));
        assert_eq!(f.line_text(3), Some("three"));
        assert_eq!(f.line_text(4), None);
        assert_eq!(f.line_count(), 3);
    }

    #[test]
    fn file_table_hands_out_sequential_ids() {
        let mut table = FileTable::new();
        let a = table.add("a.kl", "a");
        let b = table.add("b.kl", "b");
        assert_eq!((a, b), (FileId(0), FileId(1)));
        assert_eq!(table.path(b), Some(Path::new("b.kl")));
    }
}
