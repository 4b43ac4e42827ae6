#![forbid(unsafe_code)]

use aegis_ast::{ErrorKind, Severity, Span, StageError};
use miette::Diagnostic;
use thiserror::Error;

/// A name, type or ownership problem found while checking a unit.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("{kind}: {message}")]
#[diagnostic(code(aegis::sema))]
pub struct SemanticError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
}

impl SemanticError {
    fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn name(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, span, message)
    }

    pub fn ty(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, span, message)
    }

    pub fn ownership(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ownership, span, message)
    }

    pub fn internal(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, span, message)
    }

    /// Warnings reuse the kind of the check that produced them.
    pub fn warning(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(kind, span, message)
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl StageError for SemanticError {
    fn kind(&self) -> ErrorKind {
        self.kind
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

    fn severity(&self) -> Severity {
        self.severity
    }
}
