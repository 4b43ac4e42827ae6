#![forbid(unsafe_code)]

use std::collections::HashMap;

use aegis_ast::Span;

use crate::ownership::OwnershipState;
use crate::types::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

#[derive(Clone, Debug)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub span: Span,
    pub state: OwnershipState,
    /// Loop nesting at the declaration; moves from deeper loops are rejected.
    pub loop_depth: usize,
    /// Set once an ownership error was reported for this binding.
    pub reported: bool,
}

/// Which case of an Option/Result a binding is known to hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Case {
    None,
    Some,
    Ok,
    Err,
}

impl Case {
    pub fn opposite(self) -> Case {
        match self {
            Case::None => Case::Some,
            Case::Some => Case::None,
            Case::Ok => Case::Err,
            Case::Err => Case::Ok,
        }
    }

    /// Tag of the case in the built-in Option/Result layouts.
    pub fn tag(self) -> u32 {
        match self {
            Case::None => aegis_ir::OPTION_NONE,
            Case::Some => aegis_ir::OPTION_SOME,
            Case::Ok => aegis_ir::RESULT_OK,
            Case::Err => aegis_ir::RESULT_ERR,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Case::None => "None",
            Case::Some => "Some",
            Case::Ok => "Ok",
            Case::Err => "Err",
        }
    }
}

#[derive(Debug, Default)]
struct Frame {
    names: HashMap<String, BindingId>,
    narrowed: HashMap<BindingId, Case>,
}

/// Binding arena plus the chain of lexical frames. Bindings outlive their
/// frame in the arena so ownership snapshots stay index-stable.
#[derive(Debug, Default)]
pub struct Scopes {
    arena: Vec<Binding>,
    frames: Vec<Frame>,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            frames: vec![Frame::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Declares `binding` in the innermost frame. On a redeclaration the
    /// earlier binding's span is returned.
    pub fn declare(&mut self, binding: Binding) -> Result<BindingId, Span> {
        let id = BindingId(self.arena.len() as u32);
        let Some(frame) = self.frames.last_mut() else {
            return Err(binding.span);
        };
        if let Some(prev) = frame.names.get(&binding.name) {
            return Err(self.arena[prev.0 as usize].span);
        }
        frame.names.insert(binding.name.clone(), id);
        self.arena.push(binding);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<BindingId> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.names.get(name).copied())
    }

    pub fn get(&self, id: BindingId) -> &Binding {
        &self.arena[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.arena[id.0 as usize]
    }

    pub fn narrow(&mut self, id: BindingId, case: Case) {
        if let Some(frame) = self.frames.last_mut() {
            frame.narrowed.insert(id, case);
        }
    }

    pub fn case_of(&self, id: BindingId) -> Option<Case> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.narrowed.get(&id).copied())
    }

    /// Forgets every narrowing of `id`, e.g. after it is reassigned.
    pub fn forget_case(&mut self, id: BindingId) {
        for frame in &mut self.frames {
            frame.narrowed.remove(&id);
        }
    }

    /// Snapshot of every frame's narrowings, innermost last.
    pub fn cases(&self) -> Vec<HashMap<BindingId, Case>> {
        self.frames.iter().map(|f| f.narrowed.clone()).collect()
    }

    /// Restores a `cases()` snapshot taken at the same frame depth.
    pub fn restore_cases(&mut self, cases: &[HashMap<BindingId, Case>]) {
        for (frame, narrowed) in self.frames.iter_mut().zip(cases) {
            frame.narrowed = narrowed.clone();
        }
    }

    /// Keeps only the narrowings that also hold in `other`.
    pub fn meet_cases(&mut self, other: &[HashMap<BindingId, Case>]) {
        for (frame, narrowed) in self.frames.iter_mut().zip(other) {
            frame.narrowed.retain(|id, case| narrowed.get(id) == Some(case));
        }
    }

    pub fn states(&self) -> Vec<OwnershipState> {
        self.arena.iter().map(|b| b.state).collect()
    }

    /// Restores a snapshot. Bindings declared after it keep their state.
    pub fn restore(&mut self, states: &[OwnershipState]) {
        for (b, s) in self.arena.iter_mut().zip(states) {
            b.state = *s;
        }
    }

    /// Joins the current states with another path's snapshot.
    pub fn join(&mut self, other: &[OwnershipState]) {
        for (b, s) in self.arena.iter_mut().zip(other) {
            b.state = b.state.join(*s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_ast::span;

    fn binding(name: &str, at: usize) -> Binding {
        Binding {
            name: name.to_string(),
            ty: Type::Int,
            mutable: false,
            span: span(at, 1),
            state: OwnershipState::Owned,
            loop_depth: 0,
            reported: false,
        }
    }

    #[test]
    fn inner_frames_shadow_and_do_not_leak() {
        let mut s = Scopes::new();
        let outer = s.declare(binding("x", 0)).unwrap();
        s.push();
        let inner = s.declare(binding("x", 5)).unwrap();
        let only_inner = s.declare(binding("y", 9)).unwrap();
        assert_eq!(s.lookup("x"), Some(inner));
        assert_eq!(s.lookup("y"), Some(only_inner));
        s.pop();
        assert_eq!(s.lookup("x"), Some(outer));
        assert_eq!(s.lookup("y"), None);
    }

    #[test]
    fn redeclaration_in_one_frame_is_refused() {
        let mut s = Scopes::new();
        s.declare(binding("x", 0)).unwrap();
        assert_eq!(s.declare(binding("x", 7)).unwrap_err(), span(0, 1));
    }

    #[test]
    fn narrowing_is_scoped_to_its_frame() {
        let mut s = Scopes::new();
        let x = s.declare(binding("x", 0)).unwrap();
        s.push();
        s.narrow(x, Case::Some);
        assert_eq!(s.case_of(x), Some(Case::Some));
        s.pop();
        assert_eq!(s.case_of(x), None);
    }

    #[test]
    fn case_snapshots_restore_and_meet() {
        let mut s = Scopes::new();
        let x = s.declare(binding("x", 0)).unwrap();
        let y = s.declare(binding("y", 2)).unwrap();
        s.narrow(x, Case::Some);
        s.narrow(y, Case::Ok);
        let before = s.cases();

        s.forget_case(x);
        let other = s.cases();
        s.restore_cases(&before);
        assert_eq!(s.case_of(x), Some(Case::Some));

        s.meet_cases(&other);
        assert_eq!(s.case_of(x), None);
        assert_eq!(s.case_of(y), Some(Case::Ok));
    }
}
