#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aegis_ast::{Diagnostic, Diagnostics, Program, SourceFile};
use aegis_ir::ModuleIR;
use rayon::prelude::*;
use tracing::{debug, info_span, warn};

use crate::config::CompilerConfig;
use crate::index::GlobalIndex;
use crate::lower::lower_unit;
use crate::sema::check_unit;

/// Cancels one unit. Checked between stages; an aborted unit keeps its
/// diagnostics but never yields IR.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One source file handed to the compiler.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub name: String,
    pub text: String,
    abort: AbortHandle,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            abort: AbortHandle::new(),
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    Compiled,
    Failed,
    Aborted,
}

#[derive(Debug)]
pub struct UnitResult {
    pub name: String,
    pub status: UnitStatus,
    /// Present only for `Compiled` units.
    pub ir: Option<ModuleIR>,
}

#[derive(Debug)]
pub struct CompileOutput {
    /// In input order.
    pub units: Vec<UnitResult>,
    /// Sorted by file, line and column.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    pub fn succeeded(&self) -> bool {
        self.units.iter().all(|u| u.status == UnitStatus::Compiled)
    }

    pub fn unit(&self, name: &str) -> Option<&UnitResult> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

struct ParsedUnit {
    file: SourceFile,
    program: Program,
    clean: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile_source(&self, name: &str, text: &str) -> CompileOutput {
        self.compile_units(&[SourceUnit::new(name, text)])
    }

    /// Parses every unit in parallel, merges their declarations into one
    /// index, then checks and lowers each unit in parallel. A unit with any
    /// error produces no IR; its siblings are unaffected.
    pub fn compile_units(&self, units: &[SourceUnit]) -> CompileOutput {
        let diags = Diagnostics::new();

        let parsed: Vec<ParsedUnit> = units
            .par_iter()
            .map(|u| {
                let span = info_span!("pipeline.parse", unit = %u.name);
                let _enter = span.enter();
                let file = SourceFile::new(u.name.clone(), u.text.clone());
                let out = aegis_parse::parse_with_recovery(&u.text, self.config.max_depth);
                for e in &out.lex_errors {
                    diags.report(&file, e);
                }
                for e in &out.parse_errors {
                    diags.report(&file, e);
                }
                debug!(
                    modules = out.program.modules.len(),
                    lex_errors = out.lex_errors.len(),
                    parse_errors = out.parse_errors.len(),
                    "parsed unit"
                );
                let clean = out.is_clean();
                ParsedUnit {
                    file,
                    program: out.program,
                    clean,
                }
            })
            .collect();

        // The one barrier: every unit's declarations are visible to every other.
        let index_span = info_span!("pipeline.index", units = parsed.len());
        let index_enter = index_span.enter();
        let programs: Vec<&Program> = parsed.iter().map(|p| &p.program).collect();
        let (index, index_errors) = GlobalIndex::build(&programs);
        let mut index_failed = vec![false; parsed.len()];
        for (unit, err) in &index_errors {
            index_failed[*unit] |= err.is_error();
            diags.report(&parsed[*unit].file, err);
        }
        drop(index_enter);

        let results: Vec<UnitResult> = parsed
            .par_iter()
            .zip(units.par_iter())
            .enumerate()
            .map(|(i, (p, u))| {
                let span = info_span!("pipeline.unit", unit = %u.name);
                let _enter = span.enter();
                let finish = |status: UnitStatus, ir: Option<ModuleIR>| UnitResult {
                    name: u.name.clone(),
                    status,
                    ir,
                };
                if u.abort.is_aborted() {
                    debug!("aborted before checking");
                    return finish(UnitStatus::Aborted, None);
                }

                let (checked, errors) = check_unit(i, &p.program, &index, &self.config.foreign);
                let mut failed = !p.clean || index_failed[i];
                for e in &errors {
                    failed |= e.is_error();
                    diags.report(&p.file, e);
                }
                if failed {
                    debug!(errors = errors.len(), "unit has errors; skipping lowering");
                    return finish(UnitStatus::Failed, None);
                }
                if u.abort.is_aborted() {
                    debug!("aborted before lowering");
                    return finish(UnitStatus::Aborted, None);
                }

                let ir = match lower_unit(
                    &u.name,
                    i,
                    &p.program,
                    &index,
                    &checked,
                    &self.config.foreign,
                ) {
                    Ok(ir) => ir,
                    Err(e) => {
                        warn!(error = %e, "lowering failed");
                        diags.report(&p.file, &e);
                        return finish(UnitStatus::Failed, None);
                    }
                };
                // Partial results of a cancelled unit are dropped here.
                if u.abort.is_aborted() {
                    debug!("aborted after lowering");
                    return finish(UnitStatus::Aborted, None);
                }
                debug!(functions = ir.functions.len(), "lowered unit");
                finish(UnitStatus::Compiled, Some(ir))
            })
            .collect();

        CompileOutput {
            units: results,
            diagnostics: diags.into_sorted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_units_yield_no_ir_and_leave_siblings_alone() {
        let a = SourceUnit::new("a.ae", "module A:\n    fn one() -> int:\n        return 1\n");
        let b = SourceUnit::new("b.ae", "module B:\n    fn two() -> int:\n        return A.one() + 1\n");
        b.abort_handle().abort();
        let out = Compiler::default().compile_units(&[a, b]);
        assert_eq!(out.units[0].status, UnitStatus::Compiled);
        assert!(out.units[0].ir.is_some());
        assert_eq!(out.units[1].status, UnitStatus::Aborted);
        assert!(out.units[1].ir.is_none());
        assert!(!out.succeeded());
    }

    #[test]
    fn abort_handles_are_shared() {
        let u = SourceUnit::new("x.ae", "");
        let h = u.abort_handle();
        assert!(!u.abort.is_aborted());
        h.abort();
        assert!(u.abort.is_aborted());
    }
}
