#![forbid(unsafe_code)]

use miette::NamedSource;

use crate::Span;

/// 1-based line/column plus the absolute byte offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    /// Counted in characters, not bytes.
    pub column: u32,
    pub offset: usize,
}

#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self
            .text
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - line_start);
        Position {
            line: line_idx as u32 + 1,
            column: column as u32 + 1,
            offset,
        }
    }

    pub fn span_position(&self, span: Span) -> Position {
        self.position(span.offset())
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based_and_char_counted() {
        let file = SourceFile::new("t.ae", "ab\n\u{e9}x\n");
        assert_eq!(file.position(0).line, 1);
        assert_eq!(file.position(0).column, 1);
        let x = file.text.find('x').unwrap();
        let pos = file.position(x);
        assert_eq!((pos.line, pos.column), (2, 2));
    }
}
