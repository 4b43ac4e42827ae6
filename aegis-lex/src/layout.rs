#![forbid(unsafe_code)]

//! Indentation preprocessing.
//!
//! The layout pass owns everything that is decided per physical line before
//! the characters themselves are tokenized: block comments are blanked out,
//! leading whitespace is measured and the indentation stack is advanced.
//! All of it lives in [`LayoutState`], which the lexer threads explicitly.

/// Result of feeding one logical line's indentation width to the stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineLayout {
    /// The line opened a new block (one level deeper).
    pub indent: bool,
    /// Number of levels closed before this line.
    pub dedents: usize,
    /// The width matched no enclosing level. The line was attached to the
    /// level it dedented to.
    pub inconsistent: bool,
}

#[derive(Clone, Debug)]
pub struct LayoutState {
    stack: Vec<usize>,
    open_brackets: usize,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutState {
    pub fn new() -> Self {
        Self {
            stack: vec![0],
            open_brackets: 0,
        }
    }

    /// Width of the innermost open block.
    pub fn current(&self) -> usize {
        self.stack.last().copied().unwrap_or(0)
    }

    /// Number of open blocks above the implicit top level.
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    pub fn is_balanced(&self) -> bool {
        self.stack == [0]
    }

    /// Inside `(` or `[` a physical line continues the previous one and has
    /// no indentation meaning.
    pub fn in_continuation(&self) -> bool {
        self.open_brackets > 0
    }

    pub fn open_bracket(&mut self) {
        self.open_brackets += 1;
    }

    pub fn close_bracket(&mut self) {
        self.open_brackets = self.open_brackets.saturating_sub(1);
    }

    pub fn line(&mut self, width: usize) -> LineLayout {
        let top = self.current();
        if width > top {
            self.stack.push(width);
            return LineLayout {
                indent: true,
                ..LineLayout::default()
            };
        }

        let mut out = LineLayout::default();
        while self.current() > width {
            self.stack.pop();
            out.dedents += 1;
        }
        out.inconsistent = self.current() != width;
        out
    }

    /// Closes every open level at end of input and returns how many
    /// block-end tokens that requires.
    pub fn finish(&mut self) -> usize {
        let n = self.depth();
        self.stack.truncate(1);
        self.open_brackets = 0;
        n
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Indentation {
    /// Leading whitespace length in characters.
    pub width: usize,
    /// Byte length of the leading whitespace.
    pub bytes: usize,
    pub mixed: bool,
}

pub fn measure_indent(line: &str) -> Indentation {
    let mut width = 0;
    let mut bytes = 0;
    let (mut spaces, mut tabs) = (false, false);
    for c in line.chars() {
        match c {
            ' ' => spaces = true,
            '\t' => tabs = true,
            _ => break,
        }
        width += 1;
        bytes += c.len_utf8();
    }
    Indentation {
        width,
        bytes,
        mixed: spaces && tabs,
    }
}

/// Source with every `/* ... */` comment replaced by spaces. Newlines inside
/// comments are kept, so byte offsets and line numbers are unchanged.
#[derive(Clone, Debug)]
pub struct Blanked {
    pub text: String,
    /// Byte offset of a block comment that never closes.
    pub unterminated: Option<usize>,
}

pub fn blank_block_comments(src: &str) -> Blanked {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Code,
        Str,
        Line,
        Block,
    }

    let bytes = src.as_bytes();
    let mut out = bytes.to_vec();
    let mut mode = Mode::Code;
    let mut block_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match mode {
            Mode::Code => match b {
                b'"' => mode = Mode::Str,
                b'#' => mode = Mode::Line,
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    mode = Mode::Block;
                    block_start = i;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 2;
                    continue;
                }
                _ => {}
            },
            Mode::Str => match b {
                b'\\' if bytes.get(i + 1) == Some(&b'"') => {
                    i += 2;
                    continue;
                }
                b'"' | b'\n' => mode = Mode::Code,
                _ => {}
            },
            Mode::Line => {
                if b == b'\n' {
                    mode = Mode::Code;
                }
            }
            Mode::Block => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    mode = Mode::Code;
                    i += 2;
                    continue;
                }
                if b != b'\n' {
                    out[i] = b' ';
                }
            }
        }
        i += 1;
    }

    // Only ASCII bytes were replaced by ASCII spaces, and every byte of a
    // multi-byte character inside a comment was replaced, so the buffer is
    // still valid UTF-8.
    let text = String::from_utf8(out).unwrap_or_else(|_| src.to_string());
    Blanked {
        text,
        unterminated: (mode == Mode::Block).then_some(block_start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedent_pops_to_matching_level() {
        let mut st = LayoutState::new();
        assert!(st.line(4).indent);
        assert!(st.line(8).indent);
        let l = st.line(0);
        assert_eq!(l.dedents, 2);
        assert!(!l.inconsistent);
        assert!(st.is_balanced());
    }

    #[test]
    fn inconsistent_dedent_attaches_to_outer_level() {
        let mut st = LayoutState::new();
        st.line(4);
        st.line(8);
        let l = st.line(6);
        assert!(l.inconsistent);
        assert_eq!(l.dedents, 1);
        assert_eq!(st.current(), 4);
        assert_eq!(st.finish(), 1);
    }

    #[test]
    fn block_comments_keep_offsets_and_newlines() {
        let src = "a /* x\n\u{e9} */ b";
        let blanked = blank_block_comments(src);
        assert_eq!(blanked.text.len(), src.len());
        assert_eq!(blanked.text.find('b'), src.find(" b").map(|i| i + 1));
        assert_eq!(blanked.text.matches('\n').count(), 1);
        assert!(blanked.unterminated.is_none());
    }

    #[test]
    fn comment_markers_inside_strings_are_ignored() {
        let blanked = blank_block_comments("let s = \"/* no */\"\n");
        assert!(blanked.text.contains("/* no */"));
        let open = blank_block_comments("x\n/* never closed\n");
        assert_eq!(open.unterminated, Some(2));
    }

    #[test]
    fn mixed_whitespace_is_flagged() {
        assert!(measure_indent(" \tx").mixed);
        let ind = measure_indent("\t\tx");
        assert!(!ind.mixed);
        assert_eq!(ind.width, 2);
    }
}
