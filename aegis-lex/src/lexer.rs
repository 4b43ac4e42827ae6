#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use aegis_ast::{span_between, ErrorKind, Position, SourceFile, Span, StageError};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::layout::{blank_block_comments, measure_indent, LayoutState};
use crate::token::{Token, TokenKind};

#[derive(Clone, Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(aegis::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
}

impl LexError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl StageError for LexError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Lexical
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn span(&self) -> Span {
        self.span
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }
}

/// `## ...` comment text, kept for tooling.
#[derive(Clone, Debug, PartialEq)]
pub struct DocComment {
    pub text: String,
    pub span: Span,
}

#[derive(Clone, Debug, Default)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub doc_comments: Vec<DocComment>,
    pub errors: Vec<LexError>,
}

#[derive(Clone, Debug, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
    OutOfRange,
    Malformed,
}

#[derive(Clone, Debug, PartialEq)]
enum StrLit {
    Closed(String),
    Unterminated,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r]+")]
enum RawToken {
    #[token("module")]
    KwModule,
    #[token("struct")]
    KwStruct,
    #[token("enum")]
    KwEnum,
    #[token("const")]
    KwConst,
    #[token("fn")]
    KwFn,
    #[token("async")]
    KwAsync,
    #[token("await")]
    KwAwait,
    #[token("let")]
    KwLet,
    #[token("mut")]
    KwMut,
    #[token("return")]
    KwReturn,
    #[token("if")]
    KwIf,
    #[token("elif")]
    KwElif,
    #[token("else")]
    KwElse,
    #[token("for")]
    KwFor,
    #[token("in")]
    KwIn,
    #[token("while")]
    KwWhile,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,

    #[token("->")]
    Arrow,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token(",")]
    Comma,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // The fraction is taken by hand so `1..5` still lexes as a range.
    #[regex(r"[0-9][0-9_]*", lex_number)]
    Number(Number),

    #[token("\"", lex_string)]
    Str(StrLit),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn strip_underscores(s: &str) -> Option<String> {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return None;
    }
    Some(s.replace('_', ""))
}

fn lex_number(lex: &mut logos::Lexer<RawToken>) -> Number {
    let rest = lex.remainder().as_bytes();
    if rest.len() >= 2 && rest[0] == b'.' && rest[1].is_ascii_digit() {
        let frac = rest[1..]
            .iter()
            .take_while(|b| b.is_ascii_digit() || **b == b'_')
            .count();
        lex.bump(1 + frac);
        let slice = lex.slice();
        let Some((int, fract)) = slice.split_once('.') else {
            return Number::Malformed;
        };
        let (Some(int), Some(fract)) = (strip_underscores(int), strip_underscores(fract)) else {
            return Number::Malformed;
        };
        return match format!("{int}.{fract}").parse::<f64>() {
            Ok(f) if f.is_finite() => Number::Float(f),
            Ok(_) => Number::OutOfRange,
            Err(_) => Number::Malformed,
        };
    }

    let Some(digits) = strip_underscores(lex.slice()) else {
        return Number::Malformed;
    };
    digits
        .parse::<i64>()
        .map(Number::Int)
        .unwrap_or(Number::OutOfRange)
}

/// Scans the body of a string literal after the opening quote. `\"` is the
/// only escape; any other backslash is kept as written.
fn lex_string(lex: &mut logos::Lexer<RawToken>) -> StrLit {
    let rest = lex.remainder();
    let mut out = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                lex.bump(i + 1);
                return StrLit::Closed(out);
            }
            '\\' if matches!(chars.peek(), Some((_, '"'))) => {
                chars.next();
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    lex.bump(rest.len());
    StrLit::Unterminated
}

/// Byte offset of a `#` that starts a comment, skipping string literals.
fn comment_start(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut in_str = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_str && bytes.get(i + 1) == Some(&b'"') => i += 1,
            b'"' => in_str = !in_str,
            b'#' if !in_str => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

pub struct Lexer<'a> {
    src: &'a str,
}

struct LineCursor<'s> {
    start: usize,
    number: u32,
    text: &'s str,
}

impl LineCursor<'_> {
    fn position(&self, rel: usize) -> Position {
        let column = self
            .text
            .get(..rel)
            .map(|s| s.chars().count())
            .unwrap_or(rel);
        Position {
            line: self.number,
            column: column as u32 + 1,
            offset: self.start + rel,
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    /// Tokenizes the whole input. Errors are collected and lexing continues,
    /// so one run reports every lexical problem in the file.
    pub fn lex(&self) -> LexOutput {
        let mut out = LexOutput::default();
        let mut layout = LayoutState::new();

        let blanked = blank_block_comments(self.src);
        if let Some(at) = blanked.unterminated {
            out.errors.push(
                LexError::new("unterminated block comment", span_between(at, at + 2))
                    .with_help("close the comment with `*/`"),
            );
        }

        let mut line_start = 0usize;
        for (idx, raw_line) in blanked.text.split_inclusive('\n').enumerate() {
            let line_end = line_start + raw_line.len();
            let content = raw_line.trim_end_matches(['\n', '\r']);
            let cursor = LineCursor {
                start: line_start,
                number: idx as u32 + 1,
                text: content,
            };

            let code_end = match comment_start(content) {
                Some(hash) => {
                    if content[hash..].starts_with("##") {
                        out.doc_comments.push(DocComment {
                            text: content[hash + 2..].trim().to_string(),
                            span: span_between(line_start + hash, line_start + content.len()),
                        });
                    }
                    hash
                }
                None => content.len(),
            };
            let code = &content[..code_end];

            if code.trim().is_empty() {
                line_start = line_end;
                continue;
            }

            if !layout.in_continuation() {
                // Indentation is measured on the original text so a leading
                // block comment does not count as whitespace.
                let original = self
                    .src
                    .get(line_start..line_start + code_end)
                    .unwrap_or(code);
                let indent = measure_indent(original);
                if indent.mixed {
                    out.errors.push(
                        LexError::new(
                            "tabs and spaces mixed in indentation",
                            span_between(line_start, line_start + indent.bytes),
                        )
                        .with_help("indent with either spaces or tabs on a single line"),
                    );
                }
                self.apply_layout(&mut out, &mut layout, &cursor, indent.width, indent.bytes);
            }

            self.lex_line(&mut out, &mut layout, &cursor, code_end);

            if !layout.in_continuation() {
                out.tokens.push(Token {
                    kind: TokenKind::Newline,
                    lexeme: String::new(),
                    span: span_between(line_start + code_end, line_start + code_end),
                    pos: cursor.position(code_end),
                });
            }

            line_start = line_end;
        }

        let end = self.src.len();
        let end_pos = SourceFile::new("", self.src).position(end);

        if layout.in_continuation() {
            out.errors.push(LexError::new(
                "unclosed bracket at end of input",
                span_between(end, end),
            ));
            out.tokens.push(Token {
                kind: TokenKind::Newline,
                lexeme: String::new(),
                span: span_between(end, end),
                pos: end_pos,
            });
        }

        for _ in 0..layout.finish() {
            out.tokens.push(Token {
                kind: TokenKind::Dedent,
                lexeme: String::new(),
                span: span_between(end, end),
                pos: end_pos,
            });
        }

        out.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: span_between(end, end),
            pos: end_pos,
        });

        out
    }

    fn apply_layout(
        &self,
        out: &mut LexOutput,
        layout: &mut LayoutState,
        cursor: &LineCursor<'_>,
        width: usize,
        indent_bytes: usize,
    ) {
        let outer = layout.current();
        let step = layout.line(width);
        let at = cursor.start + indent_bytes;
        if step.indent {
            out.tokens.push(Token {
                kind: TokenKind::Indent,
                lexeme: String::new(),
                span: span_between(cursor.start, at),
                pos: cursor.position(0),
            });
            return;
        }
        for _ in 0..step.dedents {
            out.tokens.push(Token {
                kind: TokenKind::Dedent,
                lexeme: String::new(),
                span: span_between(at, at),
                pos: cursor.position(indent_bytes),
            });
        }
        if step.inconsistent {
            out.errors.push(
                LexError::new("inconsistent indentation", span_between(cursor.start, at))
                    .with_help(format!(
                        "dedent to a width used by an enclosing block ({} is the nearest, this block was {outer})",
                        layout.current()
                    )),
            );
        }
    }

    fn lex_line(
        &self,
        out: &mut LexOutput,
        layout: &mut LayoutState,
        cursor: &LineCursor<'_>,
        to: usize,
    ) {
        let code = &cursor.text[..to];
        let mut lex = RawToken::lexer(code);
        while let Some(raw) = lex.next() {
            let rel = lex.span();
            let (rel_start, rel_end) = (rel.start, rel.end);
            let span = span_between(cursor.start + rel_start, cursor.start + rel_end);
            let lexeme = lex.slice().to_string();

            let kind = match raw {
                Ok(tok) => match self.convert(tok, span, out) {
                    Some(kind) => kind,
                    None => continue,
                },
                Err(()) => {
                    out.errors.push(LexError::new(
                        format!("unexpected character `{lexeme}`"),
                        span,
                    ));
                    continue;
                }
            };

            match kind {
                TokenKind::LParen | TokenKind::LBracket => layout.open_bracket(),
                TokenKind::RParen | TokenKind::RBracket => layout.close_bracket(),
                _ => {}
            }

            out.tokens.push(Token {
                kind,
                lexeme,
                span,
                pos: cursor.position(rel_start),
            });
        }
    }

    fn convert(&self, raw: RawToken, span: Span, out: &mut LexOutput) -> Option<TokenKind> {
        Some(match raw {
            RawToken::KwModule => TokenKind::KwModule,
            RawToken::KwStruct => TokenKind::KwStruct,
            RawToken::KwEnum => TokenKind::KwEnum,
            RawToken::KwConst => TokenKind::KwConst,
            RawToken::KwFn => TokenKind::KwFn,
            RawToken::KwAsync => TokenKind::KwAsync,
            RawToken::KwAwait => TokenKind::KwAwait,
            RawToken::KwLet => TokenKind::KwLet,
            RawToken::KwMut => TokenKind::KwMut,
            RawToken::KwReturn => TokenKind::KwReturn,
            RawToken::KwIf => TokenKind::KwIf,
            RawToken::KwElif => TokenKind::KwElif,
            RawToken::KwElse => TokenKind::KwElse,
            RawToken::KwFor => TokenKind::KwFor,
            RawToken::KwIn => TokenKind::KwIn,
            RawToken::KwWhile => TokenKind::KwWhile,
            RawToken::KwTrue => TokenKind::KwTrue,
            RawToken::KwFalse => TokenKind::KwFalse,

            RawToken::Arrow => TokenKind::Arrow,
            RawToken::EqEq => TokenKind::EqEq,
            RawToken::Neq => TokenKind::Neq,
            RawToken::Le => TokenKind::Le,
            RawToken::Ge => TokenKind::Ge,
            RawToken::Lt => TokenKind::Lt,
            RawToken::Gt => TokenKind::Gt,
            RawToken::AndAnd => TokenKind::AndAnd,
            RawToken::OrOr => TokenKind::OrOr,
            RawToken::Bang => TokenKind::Bang,
            RawToken::Question => TokenKind::Question,

            RawToken::Plus => TokenKind::Plus,
            RawToken::Minus => TokenKind::Minus,
            RawToken::Star => TokenKind::Star,
            RawToken::Slash => TokenKind::Slash,
            RawToken::Percent => TokenKind::Percent,

            RawToken::DotDot => TokenKind::DotDot,
            RawToken::Dot => TokenKind::Dot,
            RawToken::Colon => TokenKind::Colon,
            RawToken::Eq => TokenKind::Eq,
            RawToken::Comma => TokenKind::Comma,

            RawToken::LParen => TokenKind::LParen,
            RawToken::RParen => TokenKind::RParen,
            RawToken::LBracket => TokenKind::LBracket,
            RawToken::RBracket => TokenKind::RBracket,

            RawToken::Ident(s) => TokenKind::Ident(s),
            RawToken::Number(Number::Int(n)) => TokenKind::Int(n),
            RawToken::Number(Number::Float(f)) => TokenKind::Float(f),
            RawToken::Number(Number::OutOfRange) => {
                out.errors.push(
                    LexError::new("numeric literal out of range", span)
                        .with_help("integers are signed 64-bit and floats must be finite"),
                );
                return None;
            }
            RawToken::Number(Number::Malformed) => {
                out.errors.push(LexError::new("invalid numeric literal", span));
                return None;
            }
            RawToken::Str(StrLit::Closed(s)) => TokenKind::Str(s),
            RawToken::Str(StrLit::Unterminated) => {
                out.errors.push(
                    LexError::new("unterminated string literal", span)
                        .with_help("strings end on the line they start; close it with `\"`"),
                );
                return None;
            }
        })
    }
}
