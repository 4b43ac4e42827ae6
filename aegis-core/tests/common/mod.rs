#![allow(dead_code)]

use aegis_ast::{Diagnostic, ErrorKind};
use aegis_core::{CompileOutput, Compiler};
use aegis_ir::ModuleIR;

pub fn compile(src: &str) -> CompileOutput {
    Compiler::default().compile_source("main.ae", src)
}

/// Compiles `src`, panicking with the diagnostics if it produced any error.
pub fn compile_ok(src: &str) -> ModuleIR {
    let mut out = compile(src);
    assert_eq!(out.error_count(), 0, "{:#?}", out.diagnostics);
    out.units
        .remove(0)
        .ir
        .unwrap_or_else(|| panic!("no IR for a clean unit: {:#?}", out.diagnostics))
}

pub fn errors_of(out: &CompileOutput, kind: ErrorKind) -> Vec<&Diagnostic> {
    out.errors().filter(|d| d.kind == kind).collect()
}

pub fn warnings(out: &CompileOutput) -> Vec<&Diagnostic> {
    out.diagnostics.iter().filter(|d| !d.is_error()).collect()
}

pub fn has_error(out: &CompileOutput, kind: ErrorKind, needle: &str) -> bool {
    out.errors()
        .any(|d| d.kind == kind && d.message.contains(needle))
}
