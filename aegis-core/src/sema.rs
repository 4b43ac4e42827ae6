#![forbid(unsafe_code)]

use std::collections::HashMap;

use aegis_ast::{
    AssignStmt, BinOp, Block, ErrorKind, Expr, ExprKind, FnDecl, ForIter, ForStmt, Ident, IfStmt,
    Item, LetStmt, NodeId, Program, ReturnStmt, Span, Stmt, TypeRef, UnaryOp, WhileStmt,
};
use aegis_ir::Constant;

use crate::error::SemanticError;
use crate::foreign::ForeignTable;
use crate::index::{FnSig, GlobalIndex, Member};
use crate::ownership::{Conflict, OwnershipState};
use crate::scope::{Binding, BindingId, Case, Scopes};
use crate::types::{DeclRef, Type};

/// What an identifier, member or callee expression refers to.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Local(BindingId),
    Const(Constant),
    Function(DeclRef),
    Foreign(String),
    Struct(DeclRef),
    Variant { decl: DeclRef, tag: u32 },
    Builtin(Case),
    /// Struct field by declaration index.
    Field(u32),
    /// `.value` / `.error` of a narrowed Option or Result.
    Payload(Case),
}

/// A tag test such as `x == None` or `role != Role.Admin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Discrimination {
    pub scrutinee_left: bool,
    pub tag: u32,
    /// The Option/Result case being tested; `None` for enum variants.
    pub case: Option<Case>,
}

/// Side tables for one checked unit, keyed by expression id.
#[derive(Debug, Default)]
pub struct CheckedUnit {
    pub types: HashMap<NodeId, Type>,
    pub resolutions: HashMap<NodeId, Resolution>,
    pub discriminations: HashMap<NodeId, Discrimination>,
}

impl CheckedUnit {
    pub fn type_of(&self, e: &Expr) -> Option<&Type> {
        self.types.get(&e.id)
    }

    pub fn resolution(&self, e: &Expr) -> Option<&Resolution> {
        self.resolutions.get(&e.id)
    }
}

/// Checks every function of `program`, the unit at position `unit`.
/// Diagnostics are accumulated; none of them stops the walk.
pub fn check_unit(
    unit: usize,
    program: &Program,
    index: &GlobalIndex,
    foreign: &ForeignTable,
) -> (CheckedUnit, Vec<SemanticError>) {
    let mut out = CheckedUnit::default();
    let mut errors = Vec::new();

    for module in &program.modules {
        // Duplicate modules and members were reported while indexing.
        let Some(syms) = index.module(&module.name.node) else {
            continue;
        };
        if syms.unit != unit {
            continue;
        }
        for item in &module.members {
            let Item::Fn(f) = item else {
                continue;
            };
            let Some(sig) = syms.functions.get(&f.name.node) else {
                continue;
            };
            if sig.span != f.span {
                continue;
            }
            let mut checker = FnChecker {
                index,
                foreign,
                unit,
                module: &module.name.node,
                fn_name: &f.name.node,
                ret: sig.ret.clone(),
                is_async: sig.is_async,
                out: &mut out,
                scopes: Scopes::new(),
                errors: Vec::new(),
                loop_depth: 0,
            };
            checker.check_fn(f, sig);
            errors.append(&mut checker.errors);
        }
    }
    (out, errors)
}

/// A path that names a declaration rather than a local value.
#[derive(Clone, Debug)]
enum Static {
    Module(String),
    Struct(DeclRef),
    Enum(DeclRef),
    Fn(DeclRef),
    Const(DeclRef),
    Foreign(String),
    Builtin(Case),
    Variant {
        decl: DeclRef,
        variant: String,
        tag: u32,
        arity: usize,
    },
}

fn static_member(module: &str, name: &str, member: Member<'_>) -> Static {
    let decl = DeclRef::new(module, name);
    match member {
        Member::Struct(_) => Static::Struct(decl),
        Member::Enum(_) => Static::Enum(decl),
        Member::Fn(_) => Static::Fn(decl),
        Member::Const(_) => Static::Const(decl),
    }
}

/// Narrowings that hold when a condition is true or false.
#[derive(Debug, Default)]
struct Facts {
    when_true: Vec<(BindingId, Case)>,
    when_false: Vec<(BindingId, Case)>,
}

struct FnChecker<'a> {
    index: &'a GlobalIndex,
    foreign: &'a ForeignTable,
    unit: usize,
    module: &'a str,
    fn_name: &'a str,
    ret: Type,
    is_async: bool,
    out: &'a mut CheckedUnit,
    scopes: Scopes,
    errors: Vec<SemanticError>,
    loop_depth: usize,
}

impl FnChecker<'_> {
    fn check_fn(&mut self, f: &FnDecl, sig: &FnSig) {
        self.scopes.push();
        for (p, (_, ty)) in f.params.iter().zip(&sig.params) {
            self.declare(&p.name, ty.clone(), false);
        }
        let returns = self.check_block(&f.body);
        self.scopes.pop();

        if !returns && self.ret != Type::Void && !self.ret.is_error() {
            self.errors.push(
                SemanticError::ty(
                    f.name.span,
                    format!(
                        "missing return in function `{}` returning `{}`",
                        f.name.node, self.ret
                    ),
                )
                .with_help("every path through the body must end in `return`"),
            );
        }
    }

    fn declare(&mut self, name: &Ident, ty: Type, mutable: bool) -> Option<BindingId> {
        let binding = Binding {
            name: name.node.clone(),
            ty,
            mutable,
            span: name.span,
            state: OwnershipState::Owned,
            loop_depth: self.loop_depth,
            reported: false,
        };
        match self.scopes.declare(binding) {
            Ok(id) => Some(id),
            Err(_) => {
                self.errors.push(
                    SemanticError::name(
                        name.span,
                        format!("`{}` is already declared in this scope", name.node),
                    )
                    .with_help("shadowing is only allowed in a nested block"),
                );
                None
            }
        }
    }

    fn resolve_type(&mut self, tr: &TypeRef) -> Type {
        match self.index.resolve_type(self.module, tr) {
            Ok(t) => t,
            Err(e) => {
                self.errors.push(e);
                Type::Error
            }
        }
    }

    // ---- statements -------------------------------------------------------

    /// Returns true when every path through the block returns.
    fn check_block(&mut self, block: &Block) -> bool {
        self.scopes.push();
        let mut returns = false;
        let mut warned = false;
        for stmt in &block.stmts {
            if returns && !warned {
                self.errors.push(SemanticError::warning(
                    ErrorKind::Type,
                    stmt.span(),
                    "unreachable code",
                ));
                warned = true;
            }
            returns |= self.check_stmt(stmt);
        }
        self.scopes.pop();
        returns
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Let(s) => self.check_let(s),
            Stmt::Assign(s) => self.check_assign(s),
            Stmt::Return(s) => {
                self.check_return(s);
                return true;
            }
            Stmt::If(s) => return self.check_if(s),
            Stmt::For(s) => self.check_for(s),
            Stmt::While(s) => self.check_while(s),
            Stmt::Expr(e) => {
                self.check_expr(e, None);
                if !matches!(e.kind, ExprKind::Call { .. } | ExprKind::Await(_)) {
                    self.errors.push(
                        SemanticError::warning(ErrorKind::Type, e.span, "expression result is unused")
                            .with_help("bind it with `let` or remove it"),
                    );
                }
            }
        }
        false
    }

    fn check_let(&mut self, s: &LetStmt) {
        let declared = s.ty.as_ref().map(|t| self.resolve_type(t));
        let value = self.check_operand(&s.value, declared.as_ref());
        let ty = match declared {
            Some(d) => {
                self.expect_type(&d, &value, s.value.span);
                d
            }
            None if value == Type::Void => {
                self.errors.push(SemanticError::ty(
                    s.value.span,
                    format!("`{}` would have type `void`; the expression produces no value", s.name.node),
                ));
                Type::Error
            }
            None if value.contains_hole() => {
                self.errors.push(
                    SemanticError::ty(
                        s.name.span,
                        format!("cannot infer the type of `{}`", s.name.node),
                    )
                    .with_help(format!("add a type annotation: `let {}: T = ...`", s.name.node)),
                );
                Type::Error
            }
            None => value,
        };
        self.declare(&s.name, ty, s.mutable);
    }

    fn check_assign(&mut self, s: &AssignStmt) {
        let Some(root) = s.target.place_root() else {
            self.errors
                .push(SemanticError::ty(s.target.span, "invalid assignment target"));
            self.check_operand(&s.value, None);
            return;
        };
        let Some(id) = self.scopes.lookup(&root.node) else {
            let err = if self.lookup_static(&root.node).is_some() {
                SemanticError::ty(
                    root.span,
                    format!("cannot assign to `{}`; only local bindings can be assigned", root.node),
                )
            } else {
                SemanticError::name(root.span, format!("cannot find `{}` in this scope", root.node))
            };
            self.errors.push(err);
            self.check_operand(&s.value, None);
            return;
        };

        if !self.scopes.get(id).mutable {
            self.errors.push(
                SemanticError::ty(
                    s.target.span,
                    format!("cannot assign to immutable binding `{}`", root.node),
                )
                .with_help(format!("declare it with `let mut {}`", root.node)),
            );
        }

        if matches!(s.target.kind, ExprKind::Ident(_)) {
            let ty = self.scopes.get(id).ty.clone();
            self.out.resolutions.insert(s.target.id, Resolution::Local(id));
            self.out.types.insert(s.target.id, ty.clone());
            let value = self.check_operand(&s.value, Some(&ty));
            self.expect_type(&ty, &value, s.value.span);
            // A fresh value: earlier moves and case checks no longer apply.
            self.scopes.get_mut(id).state = OwnershipState::Owned;
            self.scopes.forget_case(id);
            return;
        }

        let target = self.check_place(&s.target);
        let held = match self.scopes.get(id).state.borrow_exclusive() {
            Ok(state) => {
                self.scopes.get_mut(id).state = state;
                true
            }
            Err(c) => {
                self.conflict(id, root.span, c);
                false
            }
        };
        let value = self.check_operand(&s.value, Some(&target));
        if held {
            let b = self.scopes.get_mut(id);
            b.state = b.state.release();
        }
        self.expect_type(&target, &value, s.value.span);
    }

    /// Type of an assignment target below its root binding.
    fn check_place(&mut self, e: &Expr) -> Type {
        let index = self.index;
        let ty = match &e.kind {
            ExprKind::Ident(name) => match self.scopes.lookup(&name.node) {
                Some(id) => {
                    self.read_binding(id, e.span);
                    self.out.resolutions.insert(e.id, Resolution::Local(id));
                    self.scopes.get(id).ty.clone()
                }
                None => Type::Error,
            },
            ExprKind::Member { base, member } => {
                let base_ty = self.check_place(base);
                match &base_ty {
                    Type::Error => Type::Error,
                    Type::Named(d) => {
                        match index.struct_info(d).and_then(|s| s.field(&member.node)) {
                            Some((i, t)) => {
                                self.out.resolutions.insert(e.id, Resolution::Field(i as u32));
                                t.clone()
                            }
                            None => {
                                self.no_field(&base_ty, member);
                                Type::Error
                            }
                        }
                    }
                    other => {
                        self.errors.push(SemanticError::ty(
                            member.span,
                            format!("cannot assign to `.{}` of `{other}`", member.node),
                        ));
                        Type::Error
                    }
                }
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.check_place(base);
                let idx = self.check_expr(index, Some(&Type::Int));
                self.expect_type(&Type::Int, &idx, index.span);
                self.element_of(&base_ty, base.span)
            }
            _ => {
                self.errors
                    .push(SemanticError::ty(e.span, "invalid assignment target"));
                Type::Error
            }
        };
        self.out.types.insert(e.id, ty.clone());
        ty
    }

    fn check_return(&mut self, s: &ReturnStmt) {
        let ret = self.ret.clone();
        match &s.value {
            Some(v) => {
                let ty = self.check_operand(v, Some(&ret));
                if ret == Type::Void {
                    self.errors.push(
                        SemanticError::ty(
                            v.span,
                            format!("function `{}` has no return type, but a value is returned", self.fn_name),
                        )
                        .with_help("declare the return type with `-> T`"),
                    );
                } else {
                    self.expect_type(&ret, &ty, v.span);
                }
            }
            None if ret != Type::Void && !ret.is_error() => {
                self.errors.push(SemanticError::ty(
                    s.span,
                    format!(
                        "`return` without a value in function `{}` returning `{ret}`",
                        self.fn_name
                    ),
                ));
            }
            None => {}
        }
    }

    fn check_if(&mut self, s: &IfStmt) -> bool {
        self.check_condition(&s.cond);
        let facts = self.facts(&s.cond);
        let before = self.scopes.states();
        let cases_before = self.scopes.cases();

        let (then_returns, then_facts) = self.check_narrowed(&s.then_block, &facts.when_true);
        let then_states = self.scopes.states();
        let then_cases = self.scopes.cases();
        self.scopes.restore(&before);
        self.scopes.restore_cases(&cases_before);
        let (else_returns, else_facts) = match &s.else_block {
            Some(b) => self.check_narrowed(b, &facts.when_false),
            None => (false, facts.when_false.clone()),
        };

        // Only paths that fall through reach the code after the `if`.
        match (then_returns, else_returns) {
            (false, false) => {
                self.scopes.join(&then_states);
                self.scopes.meet_cases(&then_cases);
            }
            (false, true) => {
                self.scopes.restore(&then_states);
                self.scopes.restore_cases(&then_cases);
                self.apply(&then_facts);
            }
            (true, false) => self.apply(&else_facts),
            (true, true) => {}
        }
        then_returns && else_returns
    }

    /// Checks `block` with `facts` applied. Also returns the facts that
    /// still hold where the block ends; a reassignment inside drops them.
    fn check_narrowed(
        &mut self,
        block: &Block,
        facts: &[(BindingId, Case)],
    ) -> (bool, Vec<(BindingId, Case)>) {
        self.scopes.push();
        self.apply(facts);
        let returns = self.check_block(block);
        let holding = facts
            .iter()
            .filter(|(id, case)| self.scopes.case_of(*id) == Some(*case))
            .copied()
            .collect();
        self.scopes.pop();
        (returns, holding)
    }

    /// Bindings the loop body reassigns lose their narrowing before the
    /// first iteration, since a later iteration sees the new value.
    fn forget_loop_assignments(&mut self, body: &Block) {
        let mut names = Vec::new();
        assigned_names(body, &mut names);
        for name in names {
            if let Some(id) = self.scopes.lookup(name) {
                self.scopes.forget_case(id);
            }
        }
    }

    fn check_while(&mut self, s: &WhileStmt) {
        self.forget_loop_assignments(&s.body);
        self.check_condition(&s.cond);
        let facts = self.facts(&s.cond);
        let before = self.scopes.states();
        self.loop_depth += 1;
        self.check_narrowed(&s.body, &facts.when_true);
        self.loop_depth -= 1;
        // The body may run zero times.
        self.scopes.join(&before);
    }

    fn check_for(&mut self, s: &ForStmt) {
        self.forget_loop_assignments(&s.body);
        let before = self.scopes.states();
        let mut borrowed = None;
        let elem = match &s.iter {
            ForIter::Range { start, end } => {
                for bound in [start, end] {
                    let t = self.check_expr(bound, Some(&Type::Int));
                    self.expect_type(&Type::Int, &t, bound.span);
                }
                Type::Int
            }
            ForIter::Each(array) => {
                let ty = self.check_expr(array, None);
                // The array stays borrowed while the body runs.
                if let Some(Resolution::Local(id)) = self.out.resolutions.get(&array.id).cloned() {
                    if matches!(array.kind, ExprKind::Ident(_)) {
                        if let Ok(state) = self.scopes.get(id).state.borrow_shared() {
                            self.scopes.get_mut(id).state = state;
                            borrowed = Some(id);
                        }
                    }
                }
                match ty {
                    Type::Array(elem) => *elem,
                    Type::Error => Type::Error,
                    other => {
                        self.errors.push(SemanticError::ty(
                            array.span,
                            format!("`for` can only iterate over arrays and ranges, found `{other}`"),
                        ));
                        Type::Error
                    }
                }
            }
        };

        self.loop_depth += 1;
        self.scopes.push();
        self.declare(&s.var, elem, false);
        self.check_block(&s.body);
        self.scopes.pop();
        self.loop_depth -= 1;

        if let Some(id) = borrowed {
            let b = self.scopes.get_mut(id);
            b.state = b.state.release();
        }
        self.scopes.join(&before);
    }

    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.check_expr(cond, Some(&Type::Bool));
        if !ty.compatible(&Type::Bool) {
            self.errors.push(SemanticError::ty(
                cond.span,
                format!("condition must be `bool`, found `{ty}`"),
            ));
        }
    }

    // ---- narrowing ---------------------------------------------------------

    fn facts(&self, cond: &Expr) -> Facts {
        match &cond.kind {
            ExprKind::Binary { left, op, right } => match op {
                BinOp::Eq | BinOp::Ne => {
                    let Some(d) = self.out.discriminations.get(&cond.id) else {
                        return Facts::default();
                    };
                    let Some(case) = d.case else {
                        return Facts::default();
                    };
                    let scrutinee = if d.scrutinee_left { left } else { right };
                    let Some(id) = self.local_ident(scrutinee) else {
                        return Facts::default();
                    };
                    let is = vec![(id, case)];
                    let is_not = vec![(id, case.opposite())];
                    if *op == BinOp::Eq {
                        Facts {
                            when_true: is,
                            when_false: is_not,
                        }
                    } else {
                        Facts {
                            when_true: is_not,
                            when_false: is,
                        }
                    }
                }
                BinOp::And => {
                    let mut when_true = self.facts(left).when_true;
                    when_true.extend(self.facts(right).when_true);
                    Facts {
                        when_true,
                        when_false: Vec::new(),
                    }
                }
                BinOp::Or => {
                    let mut when_false = self.facts(left).when_false;
                    when_false.extend(self.facts(right).when_false);
                    Facts {
                        when_true: Vec::new(),
                        when_false,
                    }
                }
                _ => Facts::default(),
            },
            ExprKind::Unary {
                op: UnaryOp::Not,
                expr,
            } => {
                let inner = self.facts(expr);
                Facts {
                    when_true: inner.when_false,
                    when_false: inner.when_true,
                }
            }
            _ => Facts::default(),
        }
    }

    fn apply(&mut self, facts: &[(BindingId, Case)]) {
        for (id, case) in facts {
            self.scopes.narrow(*id, *case);
        }
    }

    fn local_ident(&self, e: &Expr) -> Option<BindingId> {
        if !matches!(e.kind, ExprKind::Ident(_)) {
            return None;
        }
        match self.out.resolutions.get(&e.id) {
            Some(Resolution::Local(id)) => Some(*id),
            _ => None,
        }
    }

    fn root_local(&self, e: &Expr) -> Option<BindingId> {
        match &e.kind {
            ExprKind::Ident(_) => self.local_ident(e),
            ExprKind::Member { base, .. } | ExprKind::Index { base, .. } => self.root_local(base),
            _ => None,
        }
    }

    // ---- ownership ---------------------------------------------------------

    fn read_binding(&mut self, id: BindingId, at: Span) {
        if let Err(c) = self.scopes.get(id).state.check_read() {
            self.conflict(id, at, c);
        }
    }

    fn move_binding(&mut self, id: BindingId, at: Span) {
        let b = self.scopes.get(id);
        if !b.ty.is_linear() {
            return;
        }
        if b.loop_depth < self.loop_depth {
            let name = b.name.clone();
            self.ownership_error(
                id,
                at,
                format!("cannot move `{name}` inside a loop; it is declared outside the loop"),
                "the loop body may run more than once".to_string(),
            );
            return;
        }
        match b.state.move_out(at) {
            Ok(state) => self.scopes.get_mut(id).state = state,
            Err(c) => self.conflict(id, at, c),
        }
    }

    fn conflict(&mut self, id: BindingId, at: Span, conflict: Conflict) {
        let name = self.scopes.get(id).name.clone();
        let (message, help) = match conflict {
            Conflict::UseAfterMove { .. } => (
                format!("use of moved value `{name}`"),
                format!("`{name}` was moved earlier and cannot be used again"),
            ),
            Conflict::MoveWhileBorrowed => (
                format!("cannot move `{name}` while it is borrowed"),
                "the borrow lasts until the enclosing call or loop ends".to_string(),
            ),
            Conflict::HeldExclusively => (
                format!("cannot use `{name}` while it is being assigned to"),
                format!("`{name}` is held exclusively until the assignment completes"),
            ),
        };
        self.ownership_error(id, at, message, help);
    }

    /// Reports at most one ownership error per binding.
    fn ownership_error(&mut self, id: BindingId, at: Span, message: String, help: String) {
        let b = self.scopes.get_mut(id);
        if b.reported {
            return;
        }
        b.reported = true;
        self.errors
            .push(SemanticError::ownership(at, message).with_help(help));
    }

    // ---- expressions -------------------------------------------------------

    /// Checks an expression whose value is consumed: a bare linear local is
    /// moved.
    fn check_operand(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        let ty = self.check_expr(e, expected);
        let moved = match &e.kind {
            ExprKind::Ident(_) => self.local_ident(e),
            // Taking a linear field, element or payload by value consumes
            // the binding it lives in.
            ExprKind::Member { .. } | ExprKind::Index { .. } if ty.is_linear() => {
                self.root_local(e)
            }
            _ => None,
        };
        if let Some(id) = moved {
            self.move_binding(id, e.span);
        }
        ty
    }

    fn check_expr(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        let mut ty = self.infer(e, expected);
        if let Some(want) = expected {
            if ty.contains_hole() {
                if let Some(filled) = ty.unify(want) {
                    ty = filled;
                }
            }
        }
        self.out.types.insert(e.id, ty.clone());
        ty
    }

    fn infer(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        match &e.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::FloatLit(_) => Type::Float,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::ArrayLit(items) => self.check_array(items, expected),
            ExprKind::Ident(_) | ExprKind::Member { .. } => self.check_path(e),
            ExprKind::Call { callee, args } => self.check_call(e, callee, args, expected),
            ExprKind::Index { base, index } => {
                let base_ty = self.check_expr(base, None);
                let idx = self.check_expr(index, Some(&Type::Int));
                self.expect_type(&Type::Int, &idx, index.span);
                self.element_of(&base_ty, base.span)
            }
            ExprKind::Unary { op, expr } => {
                let ty = self.check_expr(expr, None);
                match (op, &ty) {
                    (_, Type::Error) => Type::Error,
                    (UnaryOp::Not, Type::Bool) => Type::Bool,
                    (UnaryOp::Plus | UnaryOp::Neg, Type::Int | Type::Float) => ty,
                    _ => {
                        self.errors.push(SemanticError::ty(
                            e.span,
                            format!("operator `{}` cannot be applied to `{ty}`", op.symbol()),
                        ));
                        Type::Error
                    }
                }
            }
            ExprKind::Binary { left, op, right } => self.check_binary(e, left, *op, right),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.check_condition(cond);
                let facts = self.facts(cond);
                let before = self.scopes.states();

                self.scopes.push();
                self.apply(&facts.when_true);
                let t = self.check_expr(then_expr, expected);
                self.scopes.pop();
                let then_states = self.scopes.states();
                self.scopes.restore(&before);

                let hint = expected.cloned().unwrap_or_else(|| t.clone());
                self.scopes.push();
                self.apply(&facts.when_false);
                let f = self.check_expr(else_expr, Some(&hint));
                self.scopes.pop();
                self.scopes.join(&then_states);

                match t.unify(&f) {
                    Some(ty) => ty,
                    None => {
                        self.errors.push(SemanticError::ty(
                            e.span,
                            format!("ternary branches have different types: `{t}` and `{f}`"),
                        ));
                        Type::Error
                    }
                }
            }
            ExprKind::Await(inner) => {
                if !self.is_async {
                    self.errors.push(
                        SemanticError::ty(e.span, "`await` is only allowed inside an `async fn`")
                            .with_help(format!("declare `{}` as `async fn`", self.fn_name)),
                    );
                }
                self.check_expr(inner, expected)
            }
        }
    }

    fn check_array(&mut self, items: &[Expr], expected: Option<&Type>) -> Type {
        let mut elem = match expected {
            Some(Type::Array(t)) => (**t).clone(),
            _ => Type::Hole,
        };
        for item in items {
            let hint = elem.clone();
            let ty = self.check_operand(item, Some(&hint));
            match elem.unify(&ty) {
                Some(u) => elem = u,
                None => self.errors.push(SemanticError::ty(
                    item.span,
                    format!("array element has type `{ty}`, expected `{elem}`"),
                )),
            }
        }
        Type::array(elem)
    }

    fn element_of(&mut self, ty: &Type, span: Span) -> Type {
        match ty {
            Type::Array(elem) => (**elem).clone(),
            Type::Error => Type::Error,
            other => {
                self.errors.push(SemanticError::ty(
                    span,
                    format!("cannot index into a value of type `{other}`"),
                ));
                Type::Error
            }
        }
    }

    fn expect_type(&mut self, expected: &Type, found: &Type, span: Span) {
        if found.compatible(expected) {
            return;
        }
        let mut err = SemanticError::ty(
            span,
            format!("mismatched types: expected `{expected}`, found `{found}`"),
        );
        let wrapped = match found {
            Type::Option(inner) | Type::Result(inner, _) => inner.compatible(expected),
            _ => false,
        };
        if wrapped {
            err = err.with_help(format!(
                "`{found}` must be checked with `if` before its value can be used"
            ));
        }
        self.errors.push(err);
    }

    fn no_field(&mut self, ty: &Type, member: &Ident) {
        self.errors.push(SemanticError::ty(
            member.span,
            format!("type `{ty}` has no field `{}`", member.node),
        ));
    }

    // ---- names -------------------------------------------------------------

    fn lookup_static(&self, name: &str) -> Option<Static> {
        let builtin = match name {
            "None" => Some(Case::None),
            "Some" => Some(Case::Some),
            "Ok" => Some(Case::Ok),
            "Err" => Some(Case::Err),
            _ => None,
        };
        if let Some(case) = builtin {
            return Some(Static::Builtin(case));
        }
        if let Some(member) = self.index.member(self.module, name) {
            return Some(static_member(self.module, name, member));
        }
        if self.foreign.get(name).is_some() {
            return Some(Static::Foreign(name.to_string()));
        }
        if self.index.has_module(name) {
            return Some(Static::Module(name.to_string()));
        }
        None
    }

    /// Resolves `e` as a declaration path. `Ok(None)` means `e` is an
    /// ordinary value (a local, or a member of one).
    fn static_path(&self, e: &Expr) -> Result<Option<Static>, SemanticError> {
        match &e.kind {
            ExprKind::Ident(name) => {
                if self.scopes.lookup(&name.node).is_some() {
                    return Ok(None);
                }
                self.lookup_static(&name.node).map(Some).ok_or_else(|| {
                    SemanticError::name(
                        name.span,
                        format!("cannot find `{}` in this scope", name.node),
                    )
                })
            }
            ExprKind::Member { base, member } => match self.static_path(base)? {
                Some(Static::Module(m)) => match self.index.member(&m, &member.node) {
                    Some(found) => Ok(Some(static_member(&m, &member.node, found))),
                    None => Err(SemanticError::name(
                        member.span,
                        format!("module `{m}` has no member `{}`", member.node),
                    )),
                },
                Some(Static::Enum(decl)) => {
                    let found = self
                        .index
                        .enum_info(&decl)
                        .and_then(|info| info.variant(&member.node));
                    match found {
                        Some((tag, v)) => Ok(Some(Static::Variant {
                            variant: v.name.clone(),
                            tag,
                            arity: v.payload.len(),
                            decl,
                        })),
                        None => Err(SemanticError::name(
                            member.span,
                            format!("enum `{}` has no variant `{}`", decl.name, member.node),
                        )),
                    }
                }
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn check_path(&mut self, e: &Expr) -> Type {
        match self.static_path(e) {
            Err(err) => {
                self.errors.push(err);
                Type::Error
            }
            Ok(Some(s)) => self.static_value(e, s),
            Ok(None) => match &e.kind {
                ExprKind::Ident(name) => {
                    let Some(id) = self.scopes.lookup(&name.node) else {
                        return Type::Error;
                    };
                    self.read_binding(id, e.span);
                    self.out.resolutions.insert(e.id, Resolution::Local(id));
                    self.scopes.get(id).ty.clone()
                }
                ExprKind::Member { base, member } => {
                    let base_ty = self.check_expr(base, None);
                    self.member_of(e, base, &base_ty, member)
                }
                _ => Type::Error,
            },
        }
    }

    fn static_value(&mut self, e: &Expr, s: Static) -> Type {
        let index = self.index;
        match s {
            Static::Fn(decl) => match index.member(&decl.module, &decl.name) {
                Some(Member::Fn(sig)) => {
                    self.out.resolutions.insert(e.id, Resolution::Function(decl));
                    sig.as_type()
                }
                _ => Type::Error,
            },
            Static::Const(decl) => {
                let Some(Member::Const(info)) = index.member(&decl.module, &decl.name) else {
                    return Type::Error;
                };
                match &info.value {
                    Some(v) => {
                        self.out.resolutions.insert(e.id, Resolution::Const(v.clone()));
                        info.ty.clone()
                    }
                    None => {
                        // Failures inside this unit were already reported here.
                        if index.module(&decl.module).is_some_and(|m| m.unit != self.unit) {
                            self.errors.push(SemanticError::ty(
                                e.span,
                                format!("constant `{decl}` has no value because its initializer is invalid"),
                            ));
                        }
                        Type::Error
                    }
                }
            }
            Static::Builtin(Case::None) => {
                self.out
                    .resolutions
                    .insert(e.id, Resolution::Builtin(Case::None));
                Type::option(Type::Hole)
            }
            Static::Builtin(case) => {
                self.errors.push(
                    SemanticError::ty(
                        e.span,
                        format!("`{}` expects 1 argument(s), found 0", case.name()),
                    )
                    .with_help(format!("wrap a value: `{}(x)`", case.name())),
                );
                Type::Error
            }
            Static::Variant {
                decl,
                tag,
                arity: 0,
                ..
            } => {
                self.out.resolutions.insert(
                    e.id,
                    Resolution::Variant {
                        decl: decl.clone(),
                        tag,
                    },
                );
                Type::Named(decl)
            }
            Static::Variant {
                decl,
                variant,
                arity,
                ..
            } => {
                self.errors.push(SemanticError::ty(
                    e.span,
                    format!(
                        "variant `{}.{variant}` expects {arity} argument(s), found 0",
                        decl.name
                    ),
                ));
                Type::Error
            }
            Static::Foreign(name) => {
                self.errors.push(SemanticError::ty(
                    e.span,
                    format!("foreign function `{name}` can only be called, not used as a value"),
                ));
                Type::Error
            }
            Static::Module(m) => {
                self.errors.push(SemanticError::ty(
                    e.span,
                    format!("module `{m}` is not a value"),
                ));
                Type::Error
            }
            Static::Struct(d) | Static::Enum(d) => {
                self.errors.push(SemanticError::ty(
                    e.span,
                    format!("`{}` is a type, not a value", d.name),
                ));
                Type::Error
            }
        }
    }

    fn member_of(&mut self, e: &Expr, base: &Expr, base_ty: &Type, member: &Ident) -> Type {
        let index = self.index;
        match base_ty {
            Type::Error => Type::Error,
            Type::Named(d) => {
                if let Some((i, t)) = index.struct_info(d).and_then(|s| s.field(&member.node)) {
                    self.out.resolutions.insert(e.id, Resolution::Field(i as u32));
                    return t.clone();
                }
                self.no_field(base_ty, member);
                Type::Error
            }
            Type::Option(inner) if member.node == "value" => {
                self.payload(e, base, base_ty, Case::Some, inner)
            }
            Type::Result(ok, _) if member.node == "value" => {
                self.payload(e, base, base_ty, Case::Ok, ok)
            }
            Type::Result(_, err) if member.node == "error" => {
                self.payload(e, base, base_ty, Case::Err, err)
            }
            Type::Option(_) | Type::Result(..) => {
                self.errors.push(
                    SemanticError::ty(
                        member.span,
                        format!("`{base_ty}` has no member `{}`", member.node),
                    )
                    .with_help("use `.value`, or `.error` on a `Result`, after checking the case"),
                );
                Type::Error
            }
            _ => {
                self.no_field(base_ty, member);
                Type::Error
            }
        }
    }

    /// `.value` / `.error` is only readable where the case is known.
    fn payload(&mut self, e: &Expr, base: &Expr, base_ty: &Type, case: Case, inner: &Type) -> Type {
        let binding = self.local_ident(base);
        let narrowed = binding.is_some_and(|id| self.scopes.case_of(id) == Some(case));
        if narrowed {
            self.out.resolutions.insert(e.id, Resolution::Payload(case));
            return inner.clone();
        }

        let member = if case == Case::Err { "error" } else { "value" };
        let help = match (binding, base.as_ident()) {
            (Some(_), Some(name)) => match case {
                Case::Some | Case::None => format!("check it first: `if {} != None:`", name.node),
                Case::Ok | Case::Err => {
                    format!("check it first: `if {} == {}:`", name.node, case.name())
                }
            },
            _ => "bind it with `let` and check its case with `if` first".to_string(),
        };
        self.errors.push(
            SemanticError::ty(
                e.span,
                format!(
                    "cannot use `.{member}` of `{base_ty}` without checking that it is `{}`",
                    case.name()
                ),
            )
            .with_help(help),
        );
        Type::Error
    }

    // ---- calls -------------------------------------------------------------

    fn check_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        args: &[Expr],
        expected: Option<&Type>,
    ) -> Type {
        let head = match self.static_path(callee) {
            Ok(head) => head,
            Err(err) => {
                self.errors.push(err);
                self.check_args(&[], args);
                return Type::Error;
            }
        };
        let index = self.index;
        let foreign = self.foreign;

        match head {
            Some(Static::Fn(decl)) => {
                let Some(Member::Fn(sig)) = index.member(&decl.module, &decl.name) else {
                    return Type::Error;
                };
                let params: Vec<Type> = sig.params.iter().map(|(_, t)| t.clone()).collect();
                self.arity(e.span, &format!("function `{}`", decl.name), params.len(), args.len());
                self.record(callee, Resolution::Function(decl), sig.as_type());
                self.check_args(&params, args);
                sig.ret.clone()
            }
            Some(Static::Foreign(name)) => {
                let Some(sig) = foreign.get(&name) else {
                    return Type::Error;
                };
                self.arity(e.span, &format!("function `{name}`"), sig.params.len(), args.len());
                self.record(callee, Resolution::Foreign(name), sig.as_type());
                self.check_args(&sig.params, args);
                sig.ret.clone()
            }
            Some(Static::Struct(decl)) => {
                let Some(info) = index.struct_info(&decl) else {
                    return Type::Error;
                };
                let fields: Vec<Type> = info.fields.iter().map(|(_, t)| t.clone()).collect();
                if fields.len() != args.len() {
                    self.errors.push(SemanticError::ty(
                        e.span,
                        format!(
                            "`{}` has {} field(s) but {} argument(s) were supplied",
                            decl.name,
                            fields.len(),
                            args.len()
                        ),
                    ));
                }
                let ty = Type::Named(decl.clone());
                self.record(
                    callee,
                    Resolution::Struct(decl),
                    Type::Function {
                        params: fields.clone(),
                        ret: Box::new(ty.clone()),
                    },
                );
                self.check_args(&fields, args);
                ty
            }
            Some(Static::Variant {
                decl, variant, tag, ..
            }) => {
                let payload: Vec<Type> = index
                    .enum_info(&decl)
                    .and_then(|info| info.variant(&variant))
                    .map(|(_, v)| v.payload.clone())
                    .unwrap_or_default();
                self.arity(
                    e.span,
                    &format!("variant `{}.{variant}`", decl.name),
                    payload.len(),
                    args.len(),
                );
                let ty = Type::Named(decl.clone());
                self.record(
                    callee,
                    Resolution::Variant { decl, tag },
                    Type::Function {
                        params: payload.clone(),
                        ret: Box::new(ty.clone()),
                    },
                );
                self.check_args(&payload, args);
                ty
            }
            Some(Static::Builtin(case)) => self.check_builtin(e, callee, case, args, expected),
            Some(other) => {
                let what = match &other {
                    Static::Module(m) => format!("module `{m}`"),
                    Static::Enum(d) => format!("enum `{}`", d.name),
                    Static::Const(d) => format!("constant `{}`", d.name),
                    _ => "this expression".to_string(),
                };
                self.errors.push(SemanticError::ty(
                    callee.span,
                    format!("{what} is not callable"),
                ));
                self.check_args(&[], args);
                Type::Error
            }
            None => {
                let ty = self.check_expr(callee, None);
                match ty {
                    Type::Function { params, ret } => {
                        self.arity(e.span, "this function", params.len(), args.len());
                        self.check_args(&params, args);
                        *ret
                    }
                    Type::Error => {
                        self.check_args(&[], args);
                        Type::Error
                    }
                    other => {
                        self.errors.push(SemanticError::ty(
                            callee.span,
                            format!("a value of type `{other}` is not callable"),
                        ));
                        self.check_args(&[], args);
                        Type::Error
                    }
                }
            }
        }
    }

    fn check_builtin(
        &mut self,
        e: &Expr,
        callee: &Expr,
        case: Case,
        args: &[Expr],
        expected: Option<&Type>,
    ) -> Type {
        if case == Case::None {
            self.arity(e.span, "`None`", 0, args.len());
            self.check_args(&[], args);
            self.out
                .resolutions
                .insert(callee.id, Resolution::Builtin(case));
            return Type::option(Type::Hole);
        }
        if args.len() != 1 {
            self.arity(e.span, &format!("`{}`", case.name()), 1, args.len());
            self.check_args(&[], args);
            return Type::Error;
        }

        let hint = match (case, expected) {
            (Case::Some, Some(Type::Option(t))) | (Case::Ok, Some(Type::Result(t, _))) => {
                (**t).clone()
            }
            (Case::Err, Some(Type::Result(_, t))) => (**t).clone(),
            _ => Type::Hole,
        };
        let inner = self
            .check_args(&[hint], args)
            .pop()
            .unwrap_or(Type::Error);
        self.out
            .resolutions
            .insert(callee.id, Resolution::Builtin(case));
        match case {
            Case::Some | Case::None => Type::option(inner),
            Case::Ok => Type::result(inner, Type::Hole),
            Case::Err => Type::result(Type::Hole, inner),
        }
    }

    fn record(&mut self, callee: &Expr, res: Resolution, ty: Type) {
        self.out.resolutions.insert(callee.id, res);
        self.out.types.insert(callee.id, ty);
    }

    fn arity(&mut self, span: Span, what: &str, want: usize, found: usize) {
        if want != found {
            self.errors.push(SemanticError::ty(
                span,
                format!("{what} expects {want} argument(s), found {found}"),
            ));
        }
    }

    /// Arguments are consumed left to right. A member or index argument
    /// borrows its root binding until the call completes.
    fn check_args(&mut self, params: &[Type], args: &[Expr]) -> Vec<Type> {
        let mut borrows = Vec::new();
        let mut types = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let want = params.get(i);
            let ty = self.check_operand(arg, want);
            if let Some(want) = want {
                self.expect_type(want, &ty, arg.span);
            }
            if matches!(arg.kind, ExprKind::Member { .. } | ExprKind::Index { .. }) {
                if let Some(id) = self.root_local(arg) {
                    // A failed borrow was already reported by the read.
                    if let Ok(state) = self.scopes.get(id).state.borrow_shared() {
                        self.scopes.get_mut(id).state = state;
                        borrows.push(id);
                    }
                }
            }
            types.push(ty);
        }
        for id in borrows {
            let b = self.scopes.get_mut(id);
            b.state = b.state.release();
        }
        types
    }

    // ---- operators ---------------------------------------------------------

    fn check_binary(&mut self, e: &Expr, left: &Expr, op: BinOp, right: &Expr) -> Type {
        if op.is_equality() {
            if let Some(ty) = self.check_discrimination(e, left, right) {
                return ty;
            }
        }

        if op.is_logical() {
            let l = self.check_expr(left, Some(&Type::Bool));
            // `a && b` checks `b` where `a` holds; `a || b` where it does not.
            let facts = self.facts(left);
            self.scopes.push();
            if op == BinOp::And {
                self.apply(&facts.when_true);
            } else {
                self.apply(&facts.when_false);
            }
            let r = self.check_expr(right, Some(&Type::Bool));
            self.scopes.pop();
            return match (&l, &r) {
                (Type::Bool | Type::Error, Type::Bool | Type::Error) => Type::Bool,
                _ => self.operator_mismatch(e.span, op, &l, &r),
            };
        }

        let l = self.check_expr(left, None);
        let r = if op.is_equality() {
            self.check_expr(right, Some(&l))
        } else {
            self.check_expr(right, None)
        };
        if l.is_error() || r.is_error() {
            return if op.is_arithmetic() {
                Type::Error
            } else {
                Type::Bool
            };
        }

        let result = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => match (&l, &r) {
                (Type::Int, Type::Int) => Some(Type::Int),
                (Type::Float, Type::Float) => Some(Type::Float),
                (Type::String, Type::String) if op == BinOp::Add => Some(Type::String),
                _ => None,
            },
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => match (&l, &r) {
                (Type::Int, Type::Int) | (Type::Float, Type::Float) => Some(Type::Bool),
                _ => None,
            },
            BinOp::Eq | BinOp::Ne => l.compatible(&r).then_some(Type::Bool),
            BinOp::And | BinOp::Or => None,
        };
        match result {
            Some(ty) => ty,
            None if op.is_equality() => {
                self.errors.push(SemanticError::ty(
                    e.span,
                    format!("cannot compare `{l}` with `{r}`"),
                ));
                Type::Bool
            }
            None => self.operator_mismatch(e.span, op, &l, &r),
        }
    }

    fn operator_mismatch(&mut self, span: Span, op: BinOp, l: &Type, r: &Type) -> Type {
        let mut err = SemanticError::ty(
            span,
            format!("operator `{}` cannot be applied to `{l}` and `{r}`", op.symbol()),
        );
        if l.is_numeric() && r.is_numeric() {
            err = err.with_help("numbers are never converted implicitly; both operands must have the same type");
        }
        self.errors.push(err);
        if op.is_arithmetic() {
            Type::Error
        } else {
            Type::Bool
        }
    }

    /// Handles `x == None`, `r != Ok`, `role == Role.Admin` and the mirrored
    /// forms. Returns `None` when neither side is a case name.
    fn check_discrimination(&mut self, e: &Expr, left: &Expr, right: &Expr) -> Option<Type> {
        let (pattern, scrutinee, scrutinee_left) = match self.case_pattern(right) {
            Some(p) => (p, left, true),
            None => (self.case_pattern(left)?, right, false),
        };
        let pattern_expr = if scrutinee_left { right } else { left };
        let ty = self.check_expr(scrutinee, None);

        let (tag, case, label, fits) = match &pattern {
            Static::Builtin(c) => {
                let fits = match c {
                    Case::None | Case::Some => matches!(ty, Type::Option(_)),
                    Case::Ok | Case::Err => matches!(ty, Type::Result(..)),
                };
                self.out
                    .resolutions
                    .insert(pattern_expr.id, Resolution::Builtin(*c));
                (c.tag(), Some(*c), c.name().to_string(), fits)
            }
            Static::Variant {
                decl, variant, tag, ..
            } => {
                let fits = matches!(&ty, Type::Named(d) if d == decl);
                self.out.resolutions.insert(
                    pattern_expr.id,
                    Resolution::Variant {
                        decl: decl.clone(),
                        tag: *tag,
                    },
                );
                (*tag, None, format!("{}.{variant}", decl.name), fits)
            }
            _ => return None,
        };
        self.out.types.insert(pattern_expr.id, ty.clone());

        if !fits && !ty.is_error() {
            self.errors.push(SemanticError::ty(
                e.span,
                format!("cannot compare `{ty}` with `{label}`"),
            ));
        }
        self.out.discriminations.insert(
            e.id,
            Discrimination {
                scrutinee_left,
                tag,
                case,
            },
        );
        Some(Type::Bool)
    }

    fn case_pattern(&self, e: &Expr) -> Option<Static> {
        match self.static_path(e) {
            Ok(Some(s @ (Static::Builtin(_) | Static::Variant { .. }))) => Some(s),
            _ => None,
        }
    }
}

/// Names of the locals a block assigns as a whole, nested blocks included.
fn assigned_names<'b>(block: &'b Block, out: &mut Vec<&'b str>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Assign(a) => {
                if let ExprKind::Ident(name) = &a.target.kind {
                    out.push(&name.node);
                }
            }
            Stmt::If(s) => {
                assigned_names(&s.then_block, out);
                if let Some(b) = &s.else_block {
                    assigned_names(b, out);
                }
            }
            Stmt::For(s) => assigned_names(&s.body, out),
            Stmt::While(s) => assigned_names(&s.body, out),
            Stmt::Let(_) | Stmt::Return(_) | Stmt::Expr(_) => {}
        }
    }
}
