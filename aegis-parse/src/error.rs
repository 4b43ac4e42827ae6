#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use aegis_ast::{ErrorKind, Span, StageError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Clone, Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(aegis::parse))]
#[allow(unused_assignments)]
pub struct ParseError {
    pub message: String,
    #[label]
    pub span: Span,
    /// Nesting exceeded the configured depth rather than a grammar violation.
    pub resource_limit: bool,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            resource_limit: false,
        }
    }
}

impl StageError for ParseError {
    fn kind(&self) -> ErrorKind {
        if self.resource_limit {
            ErrorKind::ResourceLimit
        } else {
            ErrorKind::Syntax
        }
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn span(&self) -> Span {
        self.span
    }
}
