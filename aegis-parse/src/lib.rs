#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use aegis_ast::Program;
use aegis_lex::{LexError, Lexer};

pub use error::ParseError;
pub use fmt::{format_expr, format_program, format_type};
pub use parser::{Parser, DEFAULT_MAX_DEPTH};

/// Output of the front half of the pipeline for one file.
#[derive(Debug)]
pub struct Parsed {
    pub program: Program,
    pub lex_errors: Vec<LexError>,
    pub parse_errors: Vec<ParseError>,
}

impl Parsed {
    pub fn is_clean(&self) -> bool {
        self.lex_errors.is_empty() && self.parse_errors.is_empty()
    }
}

/// Lexes and parses `src`, collecting every lexical and syntax error.
pub fn parse_with_recovery(src: &str, max_depth: usize) -> Parsed {
    let lexed = Lexer::new(src).lex();
    let mut parser = Parser::with_max_depth(&lexed.tokens, max_depth);
    let (program, parse_errors) = parser.parse_program();
    Parsed {
        program,
        lex_errors: lexed.errors,
        parse_errors,
    }
}

/// Strict variant: the first lexical or syntax error becomes the `Err`.
pub fn parse_source(src: &str) -> miette::Result<Program> {
    let parsed = parse_with_recovery(src, DEFAULT_MAX_DEPTH);
    if let Some(err) = parsed.lex_errors.into_iter().next() {
        return Err(err.into());
    }
    if let Some(err) = parsed.parse_errors.into_iter().next() {
        return Err(err.into());
    }
    Ok(parsed.program)
}

pub fn parse_expr(src: &str) -> miette::Result<aegis_ast::Expr> {
    let lexed = Lexer::new(src).lex();
    if let Some(err) = lexed.errors.into_iter().next() {
        return Err(err.into());
    }
    let mut parser = Parser::new(&lexed.tokens);
    Ok(parser.parse_expr_eof()?)
}

/// Parses a standalone type such as `fn(string) -> Option<int>`.
pub fn parse_type(src: &str) -> miette::Result<aegis_ast::TypeRef> {
    let lexed = Lexer::new(src).lex();
    if let Some(err) = lexed.errors.into_iter().next() {
        return Err(err.into());
    }
    let mut parser = Parser::new(&lexed.tokens);
    Ok(parser.parse_type_eof()?)
}
