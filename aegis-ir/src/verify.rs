#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use aegis_ast::{ErrorKind, Span, StageError};
use miette::Diagnostic;
use thiserror::Error;

use crate::{BlockId, FunctionIR, InstKind, ModuleIR, Projection, SlotId, ValueId};

/// A broken IR invariant. This always points at a lowering bug, never at the
/// user's program.
#[derive(Debug, Error, Diagnostic)]
#[error("IR invariant violated in `{function}`: {message}")]
#[diagnostic(code(aegis::internal))]
pub struct VerifyError {
    pub function: String,
    pub message: String,
    #[label]
    pub span: Span,
}

impl StageError for VerifyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn span(&self) -> Span {
        self.span
    }
}

pub fn verify_module(module: &ModuleIR) -> Result<(), VerifyError> {
    for f in &module.functions {
        verify_function(f)?;
    }
    Ok(())
}

pub fn verify_function(f: &FunctionIR) -> Result<(), VerifyError> {
    let fail = |message: String| VerifyError {
        function: f.qualified_name(),
        message,
        span: f.span,
    };

    let Some(first) = f.blocks.first() else {
        return Err(fail("function has no blocks".to_string()));
    };
    if first.id != f.entry {
        return Err(fail(format!("entry {} is not the first block", f.entry)));
    }

    let mut ids = BTreeSet::new();
    for b in &f.blocks {
        if !ids.insert(b.id) {
            return Err(fail(format!("block {} defined twice", b.id)));
        }
    }

    let mut preds: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for b in &f.blocks {
        for succ in b.term.successors() {
            if !ids.contains(&succ) {
                return Err(fail(format!("{} branches to missing block {succ}", b.id)));
            }
            preds.entry(succ).or_default().insert(b.id);
        }
    }

    // Reachability from the entry block.
    let mut seen = BTreeSet::from([f.entry]);
    let mut work = vec![f.entry];
    while let Some(id) = work.pop() {
        if let Some(b) = f.block(id) {
            for succ in b.term.successors() {
                if seen.insert(succ) {
                    work.push(succ);
                }
            }
        }
    }
    if let Some(dead) = f.blocks.iter().find(|b| !seen.contains(&b.id)) {
        return Err(fail(format!("block {} is unreachable", dead.id)));
    }

    let mut defined: BTreeSet<ValueId> = BTreeSet::new();
    let mut slots: BTreeSet<SlotId> = BTreeSet::new();
    for (i, b) in f.blocks.iter().enumerate() {
        for inst in &b.insts {
            if let Some(dest) = inst.dest {
                if !defined.insert(dest) {
                    return Err(fail(format!("value {dest} defined twice")));
                }
            }
            if let InstKind::Alloca { slot, .. } = inst.kind {
                if i != 0 {
                    return Err(fail(format!("alloca of {slot} outside the entry block")));
                }
                slots.insert(slot);
            }
        }
    }
    for p in &f.params {
        if !slots.contains(&p.slot) {
            return Err(fail(format!("parameter `{}` has no slot", p.name)));
        }
    }

    for b in &f.blocks {
        let has_suspend = b
            .insts
            .iter()
            .any(|i| matches!(i.kind, InstKind::Suspend { .. }));
        if has_suspend != b.suspend_boundary {
            return Err(fail(format!("{} has a stale suspend flag", b.id)));
        }
        if has_suspend && !f.is_async {
            return Err(fail(format!("{} suspends inside a synchronous function", b.id)));
        }

        for inst in &b.insts {
            let mut used: Vec<ValueId> = Vec::new();
            let mut place_slot = None;
            match &inst.kind {
                InstKind::Alloca { .. } | InstKind::Const(_) | InstKind::FuncRef { .. } => {}
                InstKind::Load { place } => {
                    place_slot = Some(place.slot);
                    used.extend(index_values(&place.projections));
                }
                InstKind::Store { place, value } => {
                    place_slot = Some(place.slot);
                    used.extend(index_values(&place.projections));
                    used.push(*value);
                }
                InstKind::Unary { operand, .. } => used.push(*operand),
                InstKind::Binary { left, right, .. } => used.extend([*left, *right]),
                InstKind::MakeStruct { fields: vs }
                | InstKind::MakeVariant { payload: vs, .. }
                | InstKind::MakeArray { items: vs }
                | InstKind::Call { args: vs, .. } => used.extend(vs.iter().copied()),
                InstKind::ExtractField { base, .. } => used.push(*base),
                InstKind::ExtractIndex { base, index } => used.extend([*base, *index]),
                InstKind::TagOf { value }
                | InstKind::Payload { value, .. }
                | InstKind::Suspend { value } => used.push(*value),
                InstKind::ArrayLen { array } => used.push(*array),
                InstKind::CallIndirect { callee, args } => {
                    used.push(*callee);
                    used.extend(args.iter().copied());
                }
                InstKind::Phi { incomings } => {
                    let block_preds = preds.get(&b.id);
                    for (from, v) in incomings {
                        if !block_preds.is_some_and(|p| p.contains(from)) {
                            return Err(fail(format!(
                                "phi in {} names {from}, which is not a predecessor",
                                b.id
                            )));
                        }
                        used.push(*v);
                    }
                }
            }
            if let Some(slot) = place_slot {
                if !slots.contains(&slot) {
                    return Err(fail(format!("{} uses unallocated slot {slot}", b.id)));
                }
            }
            if let Some(v) = used.iter().find(|v| !defined.contains(v)) {
                return Err(fail(format!("{} uses undefined value {v}", b.id)));
            }
        }

        let term_uses = match &b.term {
            crate::Terminator::Return(v) => *v,
            crate::Terminator::Br(_) => None,
            crate::Terminator::CondBr { cond, .. } => Some(*cond),
        };
        if let Some(v) = term_uses.filter(|v| !defined.contains(v)) {
            return Err(fail(format!("terminator of {} uses undefined value {v}", b.id)));
        }
    }

    Ok(())
}

fn index_values(projections: &[Projection]) -> impl Iterator<Item = ValueId> + '_ {
    projections.iter().filter_map(|p| match p {
        Projection::Index(v) => Some(*v),
        Projection::Field(_) => None,
    })
}
