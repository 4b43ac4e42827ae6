#![forbid(unsafe_code)]

use aegis_ast::{Diagnostic, Span};
use aegis_core::{CompileOutput, UnitStatus};
use serde::Serialize;

pub const CHECK_SCHEMA: &str = "aegis.check.v1";

#[derive(Debug, Clone, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<Span> for SpanRange {
    fn from(s: Span) -> Self {
        Self {
            offset: s.offset(),
            len: s.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub schema: &'static str,
    pub ok: bool,
    pub errors: usize,
    pub warnings: usize,
    pub units: Vec<UnitReport>,
    pub diagnostics: Vec<DiagnosticReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub severity: String,
    pub kind: String,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub span: SpanRange,
}

impl From<&Diagnostic> for DiagnosticReport {
    fn from(d: &Diagnostic) -> Self {
        Self {
            severity: d.severity.to_string(),
            kind: d.kind.to_string(),
            code: d.kind.code(),
            message: d.message.clone(),
            help: d.help.clone(),
            file: d.file.clone(),
            line: d.line,
            column: d.column,
            span: d.span.into(),
        }
    }
}

fn status_name(status: UnitStatus) -> &'static str {
    match status {
        UnitStatus::Compiled => "compiled",
        UnitStatus::Failed => "failed",
        UnitStatus::Aborted => "aborted",
    }
}

pub fn check_report(out: &CompileOutput) -> CheckReport {
    let errors = out.error_count();
    CheckReport {
        schema: CHECK_SCHEMA,
        ok: out.succeeded(),
        errors,
        warnings: out.diagnostics.len() - errors,
        units: out
            .units
            .iter()
            .map(|u| UnitReport {
                name: u.name.clone(),
                status: status_name(u.status),
                functions: u.ir.as_ref().map(|ir| ir.functions.len()),
            })
            .collect(),
        diagnostics: out.diagnostics.iter().map(DiagnosticReport::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::Compiler;

    #[test]
    fn report_carries_positions_and_statuses() {
        let out = Compiler::default().compile_source(
            "main.ae",
            "module M:\n    fn foo() -> int:\n        return x\n",
        );
        let report = check_report(&out);
        assert!(!report.ok);
        assert_eq!(report.errors, 1);
        assert_eq!(report.units[0].status, "failed");
        assert!(report.units[0].functions.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["schema"], CHECK_SCHEMA);
        assert_eq!(json["diagnostics"][0]["kind"], "NameError");
        assert_eq!(json["diagnostics"][0]["line"], 3);
        assert_eq!(json["diagnostics"][0]["column"], 16);
        assert_eq!(json["diagnostics"][0]["span"]["len"], 1);
    }

    #[test]
    fn clean_units_report_their_function_count() {
        let out = Compiler::default().compile_source(
            "main.ae",
            "module M:\n    fn one() -> int:\n        return 1\n",
        );
        let report = check_report(&out);
        assert!(report.ok);
        assert_eq!(report.units[0].status, "compiled");
        assert_eq!(report.units[0].functions, Some(1));
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("\"help\""));
    }
}
