#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};

use aegis_ast::{
    AssignStmt, BinOp as AstBinOp, Block, Expr, ExprKind, FnDecl, ForIter, ForStmt, IfStmt, Item,
    LetStmt, Program, Span, Stmt, UnaryOp as AstUnaryOp, WhileStmt,
};
use aegis_ir::{
    BasicBlock, BinOp, BlockId, Callee, ConstIR, Constant, ForeignSig, FunctionIR, IdGen, Inst,
    InstKind, Layout, ModuleIR, Param, Place, Projection, SlotId, Terminator, Type, UnaryOp,
    ValueId, VariantLayout,
};
use rayon::prelude::*;

use crate::error::SemanticError;
use crate::foreign::ForeignTable;
use crate::index::{FnSig, GlobalIndex};
use crate::sema::{CheckedUnit, Resolution};
use crate::types;

/// Lowers an error-free unit. Struct and enum layouts, constants and the
/// foreign functions it calls are attached to the module; functions are
/// lowered in parallel and verified before the module is returned.
pub fn lower_unit(
    name: &str,
    unit: usize,
    program: &Program,
    index: &GlobalIndex,
    checked: &CheckedUnit,
    foreign: &ForeignTable,
) -> Result<ModuleIR, SemanticError> {
    let mut module = ModuleIR::new(name);
    let mut work: Vec<(&str, &FnDecl, &FnSig)> = Vec::new();

    for decl in &program.modules {
        let mname = decl.name.node.as_str();
        let Some(syms) = index.module(mname).filter(|m| m.unit == unit) else {
            continue;
        };
        for item in &decl.members {
            let iname = &item.name().node;
            match item {
                Item::Struct(_) => {
                    if let Some(info) = syms.structs.get(iname) {
                        let fields = info
                            .fields
                            .iter()
                            .map(|(n, t)| (n.clone(), t.to_ir()))
                            .collect();
                        module
                            .types
                            .insert(format!("{mname}.{iname}"), Layout::Struct { fields });
                    }
                }
                Item::Enum(_) => {
                    if let Some(info) = syms.enums.get(iname) {
                        let variants = info
                            .variants
                            .iter()
                            .enumerate()
                            .map(|(tag, v)| {
                                VariantLayout::new(
                                    v.name.clone(),
                                    tag as u32,
                                    v.payload.iter().map(types::Type::to_ir).collect(),
                                )
                            })
                            .collect();
                        module
                            .types
                            .insert(format!("{mname}.{iname}"), Layout::Enum { variants });
                    }
                }
                Item::Const(_) => {
                    if let Some(value) = syms.consts.get(iname).and_then(|c| c.value.clone()) {
                        module.constants.push(ConstIR {
                            module: mname.to_string(),
                            name: iname.clone(),
                            value,
                        });
                    }
                }
                Item::Fn(f) => {
                    if let Some(sig) = syms.functions.get(iname).filter(|s| s.span == f.span) {
                        work.push((mname, f, sig));
                    }
                }
            }
        }
    }

    module.functions = work
        .par_iter()
        .map(|(mname, f, sig)| Lowerer::new(mname, checked).lower_function(f, sig))
        .collect::<Result<Vec<_>, _>>()?;

    let mut referenced: Vec<Type> = Vec::new();
    for layout in module.types.values() {
        match layout {
            Layout::Struct { fields } => referenced.extend(fields.iter().map(|(_, t)| t.clone())),
            Layout::Enum { variants } => {
                referenced.extend(variants.iter().flat_map(|v| v.payload.iter().cloned()))
            }
        }
    }
    let mut called: BTreeMap<String, ForeignSig> = BTreeMap::new();
    for f in &module.functions {
        referenced.extend(f.params.iter().map(|p| p.ty.clone()));
        referenced.push(f.ret.clone());
        for inst in f.blocks.iter().flat_map(|b| &b.insts) {
            referenced.push(inst.ty.clone());
            if let InstKind::Call {
                callee: Callee::Foreign(name),
                ..
            } = &inst.kind
            {
                if let Some(sig) = foreign.get(name) {
                    called.insert(
                        name.clone(),
                        ForeignSig {
                            params: sig.params.iter().map(types::Type::to_ir).collect(),
                            ret: sig.ret.to_ir(),
                        },
                    );
                }
            }
        }
    }
    for ty in &referenced {
        module.intern_layout(ty);
    }
    module.foreign = called;

    aegis_ir::verify_module(&module)
        .map_err(|e| SemanticError::internal(e.span, e.to_string()))?;
    Ok(module)
}

/// A block under construction; the terminator is set exactly once.
struct PendingBlock {
    id: BlockId,
    label: &'static str,
    insts: Vec<Inst>,
    term: Option<Terminator>,
    suspend_boundary: bool,
}

struct Lowerer<'c> {
    module: &'c str,
    checked: &'c CheckedUnit,
    ids: IdGen,
    blocks: Vec<PendingBlock>,
    /// `None` once the current block is terminated; later statements in the
    /// same source block are unreachable and skipped.
    current: Option<usize>,
    scopes: Vec<HashMap<String, SlotId>>,
    allocas: usize,
}

impl<'c> Lowerer<'c> {
    fn new(module: &'c str, checked: &'c CheckedUnit) -> Self {
        Self {
            module,
            checked,
            ids: IdGen::default(),
            blocks: Vec::new(),
            current: None,
            scopes: Vec::new(),
            allocas: 0,
        }
    }

    fn lower_function(mut self, f: &FnDecl, sig: &FnSig) -> Result<FunctionIR, SemanticError> {
        let entry = self.ids.fresh_block();
        self.start_block(entry, "entry");

        self.scopes.push(HashMap::new());
        let mut params = Vec::with_capacity(sig.params.len());
        for (name, ty) in &sig.params {
            let ty = ty.to_ir();
            let slot = self.alloca(name, ty.clone(), f.span);
            self.bind(name, slot);
            params.push(Param {
                name: name.clone(),
                ty,
                slot,
            });
        }
        self.lower_block(&f.body)?;
        self.scopes.pop();

        let ret = sig.ret.to_ir();
        if self.current.is_some() {
            if ret != Type::Void {
                return Err(SemanticError::internal(
                    f.span,
                    format!("control reaches the end of `{}` without a return", f.name.node),
                ));
            }
            self.terminate(Terminator::Return(None));
        }

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for b in self.blocks {
            let Some(term) = b.term else {
                return Err(SemanticError::internal(
                    f.span,
                    format!("block {} of `{}` has no terminator", b.id, f.name.node),
                ));
            };
            blocks.push(BasicBlock {
                id: b.id,
                label: b.label,
                insts: b.insts,
                term,
                suspend_boundary: b.suspend_boundary,
            });
        }

        Ok(FunctionIR {
            module: self.module.to_string(),
            name: f.name.node.clone(),
            span: f.span,
            is_async: sig.is_async,
            params,
            ret,
            entry,
            blocks,
        })
    }

    // ---- blocks ------------------------------------------------------------

    fn start_block(&mut self, id: BlockId, label: &'static str) {
        self.blocks.push(PendingBlock {
            id,
            label,
            insts: Vec::new(),
            term: None,
            suspend_boundary: false,
        });
        self.current = Some(self.blocks.len() - 1);
    }

    fn current_id(&self, span: Span) -> Result<BlockId, SemanticError> {
        self.current
            .map(|i| self.blocks[i].id)
            .ok_or_else(|| SemanticError::internal(span, "no open block"))
    }

    fn terminate(&mut self, term: Terminator) {
        if let Some(i) = self.current.take() {
            self.blocks[i].term = Some(term);
        }
    }

    fn push(&mut self, span: Span, dest: Option<ValueId>, ty: Type, kind: InstKind) {
        if let Some(i) = self.current {
            self.blocks[i].insts.push(Inst {
                span,
                dest,
                ty,
                kind,
            });
        }
    }

    fn emit(&mut self, span: Span, ty: Type, kind: InstKind) -> ValueId {
        let v = self.ids.fresh_value();
        self.push(span, Some(v), ty, kind);
        v
    }

    /// Slots are hoisted into the entry block.
    fn alloca(&mut self, name: &str, ty: Type, span: Span) -> SlotId {
        let slot = self.ids.fresh_slot();
        let inst = Inst {
            span,
            dest: None,
            ty,
            kind: InstKind::Alloca {
                slot,
                name: name.to_string(),
            },
        };
        self.blocks[0].insts.insert(self.allocas, inst);
        self.allocas += 1;
        slot
    }

    fn bind(&mut self, name: &str, slot: SlotId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn slot(&self, name: &str, span: Span) -> Result<SlotId, SemanticError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name).copied())
            .ok_or_else(|| SemanticError::internal(span, format!("no slot for `{name}`")))
    }

    fn ty(&self, e: &Expr) -> Result<Type, SemanticError> {
        self.checked
            .type_of(e)
            .map(types::Type::to_ir)
            .ok_or_else(|| SemanticError::internal(e.span, "expression was never type checked"))
    }

    fn store(&mut self, span: Span, place: Place, value: ValueId) {
        self.push(span, None, Type::Void, InstKind::Store { place, value });
    }

    fn int(&mut self, span: Span, n: i64) -> ValueId {
        self.emit(span, Type::Int, InstKind::Const(Constant::Int(n)))
    }

    // ---- statements --------------------------------------------------------

    fn lower_block(&mut self, block: &Block) -> Result<(), SemanticError> {
        self.scopes.push(HashMap::new());
        for stmt in &block.stmts {
            if self.current.is_none() {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), SemanticError> {
        match stmt {
            Stmt::Let(s) => self.lower_let(s),
            Stmt::Assign(s) => self.lower_assign(s),
            Stmt::Return(s) => {
                let value = s.value.as_ref().map(|v| self.lower_expr(v)).transpose()?;
                self.terminate(Terminator::Return(value));
                Ok(())
            }
            Stmt::If(s) => self.lower_if(s),
            Stmt::For(s) => self.lower_for(s),
            Stmt::While(s) => self.lower_while(s),
            Stmt::Expr(e) => self.lower_expr(e).map(|_| ()),
        }
    }

    fn lower_let(&mut self, s: &LetStmt) -> Result<(), SemanticError> {
        let ty = self.ty(&s.value)?;
        let slot = self.alloca(&s.name.node, ty, s.name.span);
        let v = self.lower_expr(&s.value)?;
        self.store(s.span, Place::slot(slot), v);
        // Bound after the initializer, which may read a shadowed name.
        self.bind(&s.name.node, slot);
        Ok(())
    }

    fn lower_assign(&mut self, s: &AssignStmt) -> Result<(), SemanticError> {
        let Some(place) = self.place(&s.target)? else {
            return Err(SemanticError::internal(
                s.target.span,
                "assignment target is not a local place",
            ));
        };
        let v = self.lower_expr(&s.value)?;
        self.store(s.span, place, v);
        Ok(())
    }

    fn lower_if(&mut self, s: &IfStmt) -> Result<(), SemanticError> {
        let cond = self.lower_expr(&s.cond)?;
        let then_bb = self.ids.fresh_block();
        let mut merge = None;
        let else_bb = match &s.else_block {
            Some(_) => self.ids.fresh_block(),
            None => *merge.insert(self.ids.fresh_block()),
        };
        self.terminate(Terminator::CondBr {
            cond,
            then_bb,
            else_bb,
        });

        self.start_block(then_bb, "if.then");
        self.lower_block(&s.then_block)?;
        if self.current.is_some() {
            let m = *merge.get_or_insert_with(|| self.ids.fresh_block());
            self.terminate(Terminator::Br(m));
        }

        if let Some(b) = &s.else_block {
            self.start_block(else_bb, "if.else");
            self.lower_block(b)?;
            if self.current.is_some() {
                let m = *merge.get_or_insert_with(|| self.ids.fresh_block());
                self.terminate(Terminator::Br(m));
            }
        }

        // Without a fall-through path nothing follows the `if`.
        if let Some(m) = merge {
            self.start_block(m, "if.end");
        }
        Ok(())
    }

    fn lower_while(&mut self, s: &WhileStmt) -> Result<(), SemanticError> {
        let header = self.ids.fresh_block();
        self.terminate(Terminator::Br(header));
        self.start_block(header, "while.head");
        let cond = self.lower_expr(&s.cond)?;
        let body = self.ids.fresh_block();
        let exit = self.ids.fresh_block();
        self.terminate(Terminator::CondBr {
            cond,
            then_bb: body,
            else_bb: exit,
        });

        self.start_block(body, "while.body");
        self.lower_block(&s.body)?;
        self.terminate(Terminator::Br(header));

        self.start_block(exit, "while.end");
        Ok(())
    }

    fn lower_for(&mut self, s: &ForStmt) -> Result<(), SemanticError> {
        let span = s.span;
        match &s.iter {
            ForIter::Range { start, end } => {
                let var = self.alloca(&s.var.node, Type::Int, s.var.span);
                let lo = self.lower_expr(start)?;
                self.store(span, Place::slot(var), lo);
                let hi = self.lower_expr(end)?;

                let header = self.ids.fresh_block();
                self.terminate(Terminator::Br(header));
                self.start_block(header, "for.head");
                let i = self.emit(span, Type::Int, InstKind::Load { place: Place::slot(var) });
                let more = self.emit(
                    span,
                    Type::Bool,
                    InstKind::Binary {
                        op: BinOp::Lt,
                        left: i,
                        right: hi,
                    },
                );
                self.loop_body(s, header, more, var, None)
            }
            ForIter::Each(array) => {
                let elem = match self.ty(array)? {
                    Type::Array(elem) => *elem,
                    other => {
                        return Err(SemanticError::internal(
                            array.span,
                            format!("`for` over a non-array `{other}`"),
                        ));
                    }
                };
                let arr = self.lower_expr(array)?;
                let len = self.emit(span, Type::Int, InstKind::ArrayLen { array: arr });
                let counter = self.alloca("for.index", Type::Int, span);
                let zero = self.int(span, 0);
                self.store(span, Place::slot(counter), zero);
                let var = self.alloca(&s.var.node, elem.clone(), s.var.span);

                let header = self.ids.fresh_block();
                self.terminate(Terminator::Br(header));
                self.start_block(header, "for.head");
                let i = self.emit(span, Type::Int, InstKind::Load { place: Place::slot(counter) });
                let more = self.emit(
                    span,
                    Type::Bool,
                    InstKind::Binary {
                        op: BinOp::Lt,
                        left: i,
                        right: len,
                    },
                );
                self.loop_body(s, header, more, counter, Some((arr, var, elem)))
            }
        }
    }

    /// Body, increment and exit of a counted loop. For arrays, `each` holds
    /// the array, the element slot and the element type.
    fn loop_body(
        &mut self,
        s: &ForStmt,
        header: BlockId,
        more: ValueId,
        counter: SlotId,
        each: Option<(ValueId, SlotId, Type)>,
    ) -> Result<(), SemanticError> {
        let span = s.span;
        let body = self.ids.fresh_block();
        let exit = self.ids.fresh_block();
        self.terminate(Terminator::CondBr {
            cond: more,
            then_bb: body,
            else_bb: exit,
        });

        self.start_block(body, "for.body");
        self.scopes.push(HashMap::new());
        match each {
            Some((arr, var, elem)) => {
                let i = self.emit(span, Type::Int, InstKind::Load { place: Place::slot(counter) });
                let item = self.emit(span, elem, InstKind::ExtractIndex { base: arr, index: i });
                self.store(span, Place::slot(var), item);
                self.bind(&s.var.node, var);
            }
            None => self.bind(&s.var.node, counter),
        }
        self.lower_block(&s.body)?;
        self.scopes.pop();

        if self.current.is_some() {
            let latch = self.ids.fresh_block();
            self.terminate(Terminator::Br(latch));
            self.start_block(latch, "for.next");
            let i = self.emit(span, Type::Int, InstKind::Load { place: Place::slot(counter) });
            let one = self.int(span, 1);
            let next = self.emit(
                span,
                Type::Int,
                InstKind::Binary {
                    op: BinOp::Add,
                    left: i,
                    right: one,
                },
            );
            self.store(span, Place::slot(counter), next);
            self.terminate(Terminator::Br(header));
        }

        self.start_block(exit, "for.end");
        Ok(())
    }

    // ---- expressions -------------------------------------------------------

    /// The local place an expression names, if any. Index operands are
    /// evaluated; nothing is emitted when the answer is `None`.
    fn place(&mut self, e: &Expr) -> Result<Option<Place>, SemanticError> {
        match &e.kind {
            ExprKind::Ident(name) => match self.checked.resolution(e) {
                Some(Resolution::Local(_)) => Ok(Some(Place::slot(self.slot(&name.node, e.span)?))),
                _ => Ok(None),
            },
            ExprKind::Member { base, .. } => {
                let Some(Resolution::Field(i)) = self.checked.resolution(e) else {
                    return Ok(None);
                };
                let i = *i;
                Ok(self.place(base)?.map(|mut p| {
                    p.projections.push(Projection::Field(i));
                    p
                }))
            }
            ExprKind::Index { base, index } => {
                let Some(mut p) = self.place(base)? else {
                    return Ok(None);
                };
                let i = self.lower_expr(index)?;
                p.projections.push(Projection::Index(i));
                Ok(Some(p))
            }
            _ => Ok(None),
        }
    }

    fn lower_expr(&mut self, e: &Expr) -> Result<ValueId, SemanticError> {
        let ty = self.ty(e)?;
        let span = e.span;
        match &e.kind {
            ExprKind::IntLit(n) => Ok(self.emit(span, ty, InstKind::Const(Constant::Int(*n)))),
            ExprKind::FloatLit(x) => Ok(self.emit(span, ty, InstKind::Const(Constant::Float(*x)))),
            ExprKind::BoolLit(b) => Ok(self.emit(span, ty, InstKind::Const(Constant::Bool(*b)))),
            ExprKind::StringLit(s) => {
                Ok(self.emit(span, ty, InstKind::Const(Constant::Str(s.clone()))))
            }
            ExprKind::ArrayLit(items) => {
                let items = items
                    .iter()
                    .map(|i| self.lower_expr(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.emit(span, ty, InstKind::MakeArray { items }))
            }
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => {
                if let Some(place) = self.place(e)? {
                    return Ok(self.emit(span, ty, InstKind::Load { place }));
                }
                self.lower_path(e, ty)
            }
            ExprKind::Call { callee, args } => self.lower_call(e, callee, args, ty),
            ExprKind::Unary { op, expr } => {
                let v = self.lower_expr(expr)?;
                let op = match op {
                    AstUnaryOp::Plus => return Ok(v),
                    AstUnaryOp::Neg => UnaryOp::Neg,
                    AstUnaryOp::Not => UnaryOp::Not,
                };
                Ok(self.emit(span, ty, InstKind::Unary { op, operand: v }))
            }
            ExprKind::Binary { left, op, right } => {
                if let Some(d) = self.checked.discriminations.get(&e.id).copied() {
                    let scrutinee = if d.scrutinee_left { left } else { right };
                    let v = self.lower_expr(scrutinee)?;
                    let tag = self.emit(span, Type::Int, InstKind::TagOf { value: v });
                    let want = self.int(span, i64::from(d.tag));
                    let op = if *op == AstBinOp::Ne { BinOp::Ne } else { BinOp::Eq };
                    return Ok(self.emit(
                        span,
                        ty,
                        InstKind::Binary {
                            op,
                            left: tag,
                            right: want,
                        },
                    ));
                }
                match op {
                    AstBinOp::And | AstBinOp::Or => self.short_circuit(e, left, *op, right),
                    _ => {
                        let strings = matches!(self.ty(left)?, Type::String);
                        let l = self.lower_expr(left)?;
                        let r = self.lower_expr(right)?;
                        let op = binop(*op, strings);
                        Ok(self.emit(
                            span,
                            ty,
                            InstKind::Binary {
                                op,
                                left: l,
                                right: r,
                            },
                        ))
                    }
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.lower_expr(cond)?;
                let then_bb = self.ids.fresh_block();
                let else_bb = self.ids.fresh_block();
                let join = self.ids.fresh_block();
                self.terminate(Terminator::CondBr {
                    cond: c,
                    then_bb,
                    else_bb,
                });

                self.start_block(then_bb, "cond.then");
                let t = self.lower_expr(then_expr)?;
                let t_end = self.current_id(span)?;
                self.terminate(Terminator::Br(join));

                self.start_block(else_bb, "cond.else");
                let f = self.lower_expr(else_expr)?;
                let f_end = self.current_id(span)?;
                self.terminate(Terminator::Br(join));

                self.start_block(join, "cond.end");
                Ok(self.emit(
                    span,
                    ty,
                    InstKind::Phi {
                        incomings: vec![(t_end, t), (f_end, f)],
                    },
                ))
            }
            ExprKind::Await(inner) => {
                let v = self.lower_expr(inner)?;
                let out = self.emit(span, ty, InstKind::Suspend { value: v });
                if let Some(i) = self.current {
                    self.blocks[i].suspend_boundary = true;
                }
                Ok(out)
            }
        }
    }

    /// `a && b` evaluates `b` only when `a` is true; `a || b` only when false.
    fn short_circuit(
        &mut self,
        e: &Expr,
        left: &Expr,
        op: AstBinOp,
        right: &Expr,
    ) -> Result<ValueId, SemanticError> {
        let span = e.span;
        let l = self.lower_expr(left)?;
        let is_and = op == AstBinOp::And;
        let skipped = self.emit(span, Type::Bool, InstKind::Const(Constant::Bool(!is_and)));
        let l_end = self.current_id(span)?;
        let rhs = self.ids.fresh_block();
        let join = self.ids.fresh_block();
        let (then_bb, else_bb) = if is_and { (rhs, join) } else { (join, rhs) };
        self.terminate(Terminator::CondBr {
            cond: l,
            then_bb,
            else_bb,
        });

        self.start_block(rhs, if is_and { "and.rhs" } else { "or.rhs" });
        let r = self.lower_expr(right)?;
        let r_end = self.current_id(span)?;
        self.terminate(Terminator::Br(join));

        self.start_block(join, if is_and { "and.end" } else { "or.end" });
        Ok(self.emit(
            span,
            Type::Bool,
            InstKind::Phi {
                incomings: vec![(l_end, skipped), (r_end, r)],
            },
        ))
    }

    /// Names that are not locals: constants, functions, payload-free
    /// variants, fields of temporaries and narrowed payloads.
    fn lower_path(&mut self, e: &Expr, ty: Type) -> Result<ValueId, SemanticError> {
        let span = e.span;
        let res = self.checked.resolution(e).cloned();
        match (res, &e.kind) {
            (Some(Resolution::Const(c)), _) => Ok(self.emit(span, ty, InstKind::Const(c))),
            (Some(Resolution::Function(d)), _) => Ok(self.emit(
                span,
                ty,
                InstKind::FuncRef {
                    module: d.module,
                    name: d.name,
                },
            )),
            (Some(Resolution::Builtin(case)), _) => Ok(self.emit(
                span,
                ty,
                InstKind::MakeVariant {
                    tag: case.tag(),
                    payload: Vec::new(),
                },
            )),
            (Some(Resolution::Variant { tag, .. }), _) => Ok(self.emit(
                span,
                ty,
                InstKind::MakeVariant {
                    tag,
                    payload: Vec::new(),
                },
            )),
            (Some(Resolution::Field(index)), ExprKind::Member { base, .. }) => {
                let b = self.lower_expr(base)?;
                Ok(self.emit(span, ty, InstKind::ExtractField { base: b, index }))
            }
            (Some(Resolution::Payload(case)), ExprKind::Member { base, .. }) => {
                let b = self.lower_expr(base)?;
                Ok(self.emit(
                    span,
                    ty,
                    InstKind::Payload {
                        value: b,
                        tag: case.tag(),
                        index: 0,
                    },
                ))
            }
            (_, ExprKind::Index { base, index }) => {
                let b = self.lower_expr(base)?;
                let i = self.lower_expr(index)?;
                Ok(self.emit(span, ty, InstKind::ExtractIndex { base: b, index: i }))
            }
            _ => Err(SemanticError::internal(span, "unresolved name reached lowering")),
        }
    }

    fn lower_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        args: &[Expr],
        ty: Type,
    ) -> Result<ValueId, SemanticError> {
        let span = e.span;
        let res = self.checked.resolution(callee).cloned();
        let indirect = match res {
            Some(Resolution::Function(_) | Resolution::Foreign(_))
            | Some(Resolution::Struct(_) | Resolution::Variant { .. } | Resolution::Builtin(_)) => {
                None
            }
            _ => Some(self.lower_expr(callee)?),
        };
        let args = args
            .iter()
            .map(|a| self.lower_expr(a))
            .collect::<Result<Vec<_>, _>>()?;

        let kind = match (res, indirect) {
            (_, Some(callee)) => InstKind::CallIndirect { callee, args },
            (Some(Resolution::Function(d)), None) => InstKind::Call {
                callee: Callee::Function {
                    module: d.module,
                    name: d.name,
                },
                args,
            },
            (Some(Resolution::Foreign(name)), None) => InstKind::Call {
                callee: Callee::Foreign(name),
                args,
            },
            (Some(Resolution::Struct(_)), None) => InstKind::MakeStruct { fields: args },
            (Some(Resolution::Variant { tag, .. }), None) => InstKind::MakeVariant { tag, payload: args },
            (Some(Resolution::Builtin(case)), None) => InstKind::MakeVariant {
                tag: case.tag(),
                payload: args,
            },
            _ => return Err(SemanticError::internal(span, "unresolved callee reached lowering")),
        };
        Ok(self.emit(span, ty, kind))
    }
}

fn binop(op: AstBinOp, strings: bool) -> BinOp {
    match op {
        AstBinOp::Add if strings => BinOp::Concat,
        AstBinOp::Add => BinOp::Add,
        AstBinOp::Sub => BinOp::Sub,
        AstBinOp::Mul => BinOp::Mul,
        AstBinOp::Div => BinOp::Div,
        AstBinOp::Rem => BinOp::Rem,
        AstBinOp::Eq => BinOp::Eq,
        AstBinOp::Ne => BinOp::Ne,
        AstBinOp::Lt => BinOp::Lt,
        AstBinOp::Le => BinOp::Le,
        AstBinOp::Gt => BinOp::Gt,
        AstBinOp::Ge => BinOp::Ge,
        // Short-circuit operators are lowered to branches before this.
        AstBinOp::And | AstBinOp::Or => BinOp::Eq,
    }
}
