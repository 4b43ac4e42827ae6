#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Mutex;

use miette::LabeledSpan;
use thiserror::Error;

use crate::{SourceFile, Span};

/// Diagnostic taxonomy shared by every stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Name,
    Type,
    Ownership,
    ResourceLimit,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Lexical => "aegis::lex",
            ErrorKind::Syntax => "aegis::parse",
            ErrorKind::Name => "aegis::name",
            ErrorKind::Type => "aegis::type",
            ErrorKind::Ownership => "aegis::ownership",
            ErrorKind::ResourceLimit => "aegis::limit",
            ErrorKind::Internal => "aegis::internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lexical => "LexicalError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Name => "NameError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Ownership => "OwnershipError",
            ErrorKind::ResourceLimit => "ResourceLimitError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Implemented by each stage's error struct so the collector can flatten
/// them into one record type.
pub trait StageError {
    fn kind(&self) -> ErrorKind;
    fn message(&self) -> &str;
    fn span(&self) -> Span;

    fn help(&self) -> Option<&str> {
        None
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// One structured record `{severity, kind, message, file, line, column}`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub message: String,
    pub help: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub span: Span,
}

impl Diagnostic {
    pub fn from_stage(file: &SourceFile, err: &(impl StageError + ?Sized)) -> Self {
        let pos = file.span_position(err.span());
        Self {
            severity: err.severity(),
            kind: err.kind(),
            message: err.message().to_string(),
            help: err.help().map(str::to_string),
            file: file.name.clone(),
            line: pos.line,
            column: pos.column,
            span: err.span(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn sort_key(&self) -> (&str, u32, u32, ErrorKind, &str) {
        (&self.file, self.line, self.column, self.kind, &self.message)
    }
}

impl miette::Diagnostic for Diagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = LabeledSpan::new_with_span(Some(self.kind.to_string()), self.span);
        Some(Box::new(std::iter::once(label)))
    }
}

/// Append-only, thread-safe collector. Stages running on different worker
/// threads push into the same instance; callers read a sorted snapshot.
#[derive(Debug, Default)]
pub struct Diagnostics {
    inner: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, diag: Diagnostic) {
        self.lock().push(diag);
    }

    pub fn extend(&self, diags: impl IntoIterator<Item = Diagnostic>) {
        self.lock().extend(diags);
    }

    pub fn report(&self, file: &SourceFile, err: &(impl StageError + ?Sized)) {
        self.push(Diagnostic::from_stage(file, err));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.lock().iter().any(Diagnostic::is_error)
    }

    pub fn has_errors_in(&self, file: &str) -> bool {
        self.lock().iter().any(|d| d.is_error() && d.file == file)
    }

    pub fn error_count(&self) -> usize {
        self.lock().iter().filter(|d| d.is_error()).count()
    }

    /// Snapshot ordered by file, then line, then column. Ties fall back to
    /// kind and message so output is stable across thread schedules. Every
    /// appended record is kept, identical ones included: two units may share
    /// a name and report the same error.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut out = self.lock().clone();
        out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        out
    }

    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut out = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span;

    struct Fake {
        kind: ErrorKind,
        at: usize,
    }

    impl StageError for Fake {
        fn kind(&self) -> ErrorKind {
            self.kind
        }
        fn message(&self) -> &str {
            "boom"
        }
        fn span(&self) -> Span {
            span(self.at, 1)
        }
    }

    #[test]
    fn concurrent_appends_are_not_lost_and_sort_by_position() {
        let a = SourceFile::new("a.ae", "x\ny\nz\n");
        let b = SourceFile::new("b.ae", "x\ny\nz\n");
        let diags = Diagnostics::new();
        std::thread::scope(|s| {
            for i in 0..8 {
                let (diags, a, b) = (&diags, &a, &b);
                s.spawn(move || {
                    let file = if i % 2 == 0 { a } else { b };
                    diags.report(
                        file,
                        &Fake {
                            kind: ErrorKind::Type,
                            at: (i % 3) * 2,
                        },
                    );
                });
            }
        });
        assert_eq!(diags.len(), 8);
        let sorted = diags.sorted();
        assert_eq!(sorted.len(), 8);
        for w in sorted.windows(2) {
            assert!((&w[0].file, w[0].line) <= (&w[1].file, w[1].line));
        }
        assert_eq!(sorted[0].file, "a.ae");
        assert_eq!(sorted[0].line, 1);
    }

    #[test]
    fn identical_reports_from_same_named_units_are_both_kept() {
        let first = SourceFile::new("main.ae", "x\n");
        let second = SourceFile::new("main.ae", "x\n");
        let diags = Diagnostics::new();
        let err = Fake {
            kind: ErrorKind::Name,
            at: 0,
        };
        diags.report(&first, &err);
        diags.report(&second, &err);
        assert_eq!(diags.sorted().len(), 2);
        assert_eq!(diags.into_sorted().len(), 2);
    }

    #[test]
    fn display_uses_kind_name() {
        let file = SourceFile::new("a.ae", "abc");
        let d = Diagnostic::from_stage(
            &file,
            &Fake {
                kind: ErrorKind::Ownership,
                at: 2,
            },
        );
        assert_eq!(d.to_string(), "OwnershipError: boom");
        assert_eq!(d.column, 3);
    }
}
