#![forbid(unsafe_code)]

//! Span/id erasure, used to compare two ASTs by structure alone
//! (e.g. a pretty-printed program against the original).

use crate::{
    span, AssignStmt, Block, ConstDecl, EnumDecl, EnumVariant, Expr, ExprKind, FieldDecl, FnDecl,
    ForIter, ForStmt, Ident, IfStmt, Item, LetStmt, ModuleDecl, NodeId, Param, Program,
    ReturnStmt, Span, Stmt, StructDecl, TypeRef, TypeRefKind, WhileStmt,
};

fn blank() -> Span {
    span(0, 0)
}

fn ident(id: &Ident) -> Ident {
    Ident::new(blank(), id.node.clone())
}

impl Program {
    /// Clone of the program with every span and node id zeroed.
    pub fn erase_spans(&self) -> Program {
        Program {
            modules: self.modules.iter().map(module).collect(),
        }
    }
}

fn module(m: &ModuleDecl) -> ModuleDecl {
    ModuleDecl {
        span: blank(),
        name: ident(&m.name),
        members: m.members.iter().map(item).collect(),
    }
}

fn item(it: &Item) -> Item {
    match it {
        Item::Struct(s) => Item::Struct(StructDecl {
            span: blank(),
            name: ident(&s.name),
            fields: s
                .fields
                .iter()
                .map(|f| FieldDecl {
                    span: blank(),
                    name: ident(&f.name),
                    ty: type_ref(&f.ty),
                })
                .collect(),
        }),
        Item::Enum(e) => Item::Enum(EnumDecl {
            span: blank(),
            name: ident(&e.name),
            variants: e
                .variants
                .iter()
                .map(|v| EnumVariant {
                    span: blank(),
                    name: ident(&v.name),
                    payload: v.payload.iter().map(type_ref).collect(),
                })
                .collect(),
        }),
        Item::Fn(f) => Item::Fn(FnDecl {
            span: blank(),
            name: ident(&f.name),
            is_async: f.is_async,
            params: f
                .params
                .iter()
                .map(|p| Param {
                    span: blank(),
                    name: ident(&p.name),
                    ty: type_ref(&p.ty),
                })
                .collect(),
            ret: f.ret.as_ref().map(type_ref),
            body: block(&f.body),
        }),
        Item::Const(c) => Item::Const(ConstDecl {
            span: blank(),
            name: ident(&c.name),
            ty: type_ref(&c.ty),
            value: expr(&c.value),
        }),
    }
}

fn type_ref(t: &TypeRef) -> TypeRef {
    let kind = match &t.kind {
        TypeRefKind::Named { path, args } => TypeRefKind::Named {
            path: path.iter().map(ident).collect(),
            args: args.iter().map(type_ref).collect(),
        },
        TypeRefKind::Array(elem) => TypeRefKind::Array(Box::new(type_ref(elem))),
        TypeRefKind::Function { params, ret } => TypeRefKind::Function {
            params: params.iter().map(type_ref).collect(),
            ret: ret.as_ref().map(|r| Box::new(type_ref(r))),
        },
    };
    TypeRef { span: blank(), kind }
}

fn block(b: &Block) -> Block {
    Block {
        span: blank(),
        stmts: b.stmts.iter().map(stmt).collect(),
    }
}

fn stmt(s: &Stmt) -> Stmt {
    match s {
        Stmt::Let(l) => Stmt::Let(LetStmt {
            span: blank(),
            name: ident(&l.name),
            mutable: l.mutable,
            ty: l.ty.as_ref().map(type_ref),
            value: expr(&l.value),
        }),
        Stmt::Assign(a) => Stmt::Assign(AssignStmt {
            span: blank(),
            target: expr(&a.target),
            value: expr(&a.value),
        }),
        Stmt::Return(r) => Stmt::Return(ReturnStmt {
            span: blank(),
            value: r.value.as_ref().map(expr),
        }),
        Stmt::If(i) => Stmt::If(IfStmt {
            span: blank(),
            cond: expr(&i.cond),
            then_block: block(&i.then_block),
            else_block: i.else_block.as_ref().map(block),
        }),
        Stmt::For(f) => Stmt::For(ForStmt {
            span: blank(),
            var: ident(&f.var),
            iter: match &f.iter {
                ForIter::Range { start, end } => ForIter::Range {
                    start: expr(start),
                    end: expr(end),
                },
                ForIter::Each(e) => ForIter::Each(expr(e)),
            },
            body: block(&f.body),
        }),
        Stmt::While(w) => Stmt::While(WhileStmt {
            span: blank(),
            cond: expr(&w.cond),
            body: block(&w.body),
        }),
        Stmt::Expr(e) => Stmt::Expr(expr(e)),
    }
}

fn boxed(e: &Expr) -> Box<Expr> {
    Box::new(expr(e))
}

fn expr(e: &Expr) -> Expr {
    let kind = match &e.kind {
        ExprKind::IntLit(n) => ExprKind::IntLit(*n),
        ExprKind::FloatLit(f) => ExprKind::FloatLit(*f),
        ExprKind::BoolLit(b) => ExprKind::BoolLit(*b),
        ExprKind::StringLit(s) => ExprKind::StringLit(s.clone()),
        ExprKind::ArrayLit(items) => ExprKind::ArrayLit(items.iter().map(expr).collect()),
        ExprKind::Ident(id) => ExprKind::Ident(ident(id)),
        ExprKind::Member { base, member } => ExprKind::Member {
            base: boxed(base),
            member: ident(member),
        },
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: boxed(callee),
            args: args.iter().map(expr).collect(),
        },
        ExprKind::Index { base, index } => ExprKind::Index {
            base: boxed(base),
            index: boxed(index),
        },
        ExprKind::Unary { op, expr: inner } => ExprKind::Unary {
            op: *op,
            expr: boxed(inner),
        },
        ExprKind::Binary { left, op, right } => ExprKind::Binary {
            left: boxed(left),
            op: *op,
            right: boxed(right),
        },
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => ExprKind::Ternary {
            cond: boxed(cond),
            then_expr: boxed(then_expr),
            else_expr: boxed(else_expr),
        },
        ExprKind::Await(inner) => ExprKind::Await(boxed(inner)),
    };
    Expr {
        id: NodeId(0),
        span: blank(),
        kind,
    }
}
