#![forbid(unsafe_code)]

use aegis_ast::{Position, Span};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token; empty for synthetic layout tokens.
    pub lexeme: String,
    pub span: Span,
    pub pos: Position,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenCategory {
    Keyword,
    Identifier,
    Literal,
    Operator,
    Punctuation,
    BlockStart,
    BlockEnd,
    Newline,
    EndOfInput,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwModule,
    KwStruct,
    KwEnum,
    KwConst,
    KwFn,
    KwAsync,
    KwAwait,
    KwLet,
    KwMut,
    KwReturn,
    KwIf,
    KwElif,
    KwElse,
    KwFor,
    KwIn,
    KwWhile,
    KwTrue,
    KwFalse,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
    Arrow,
    Eq,
    Dot,
    DotDot,

    // Punctuation
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,

    // Literals / identifiers
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
}

impl TokenKind {
    pub fn category(&self) -> TokenCategory {
        use TokenKind::*;
        match self {
            KwModule | KwStruct | KwEnum | KwConst | KwFn | KwAsync | KwAwait | KwLet | KwMut
            | KwReturn | KwIf | KwElif | KwElse | KwFor | KwIn | KwWhile => TokenCategory::Keyword,
            KwTrue | KwFalse | Int(_) | Float(_) | Str(_) => TokenCategory::Literal,
            Ident(_) => TokenCategory::Identifier,
            Plus | Minus | Star | Slash | Percent | EqEq | Neq | Lt | Le | Gt | Ge | AndAnd
            | OrOr | Bang | Question | Colon | Arrow | Eq | Dot | DotDot => TokenCategory::Operator,
            Comma | LParen | RParen | LBracket | RBracket => TokenCategory::Punctuation,
            Indent => TokenCategory::BlockStart,
            Dedent => TokenCategory::BlockEnd,
            Newline => TokenCategory::Newline,
            Eof => TokenCategory::EndOfInput,
        }
    }

    /// Human-readable name used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Int(n) => format!("integer `{n}`"),
            TokenKind::Float(f) => format!("float `{f}`"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indented block".to_string(),
            TokenKind::Dedent => "end of block".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => match other.fixed_text() {
                Some(text) => format!("`{text}`"),
                None => format!("{other:?}"),
            },
        }
    }

    /// Spelling of keywords and operators.
    pub fn fixed_text(&self) -> Option<&'static str> {
        use TokenKind::*;
        Some(match self {
            KwModule => "module",
            KwStruct => "struct",
            KwEnum => "enum",
            KwConst => "const",
            KwFn => "fn",
            KwAsync => "async",
            KwAwait => "await",
            KwLet => "let",
            KwMut => "mut",
            KwReturn => "return",
            KwIf => "if",
            KwElif => "elif",
            KwElse => "else",
            KwFor => "for",
            KwIn => "in",
            KwWhile => "while",
            KwTrue => "true",
            KwFalse => "false",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            EqEq => "==",
            Neq => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            AndAnd => "&&",
            OrOr => "||",
            Bang => "!",
            Question => "?",
            Colon => ":",
            Arrow => "->",
            Eq => "=",
            Dot => ".",
            DotDot => "..",
            Comma => ",",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            _ => return None,
        })
    }

    /// Tokens that begin a module member declaration; the parser
    /// resynchronises on these at module level.
    pub fn starts_declaration(&self) -> bool {
        matches!(
            self,
            TokenKind::KwStruct
                | TokenKind::KwEnum
                | TokenKind::KwConst
                | TokenKind::KwFn
                | TokenKind::KwAsync
                | TokenKind::KwModule
        )
    }
}
