#![forbid(unsafe_code)]

use aegis_ast::{
    Block, ConstDecl, EnumDecl, Expr, ExprKind, FnDecl, ForIter, IfStmt, Item, ModuleDecl,
    Program, Stmt, StructDecl, TypeRef, TypeRefKind, UnaryOp,
};

const INDENT: &str = "    ";

/// Binding strength of each expression form, loosest first. Parentheses are
/// emitted only where a child binds looser than its position requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Ternary,
    Or,
    And,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
    Await,
    Postfix,
    Atom,
}

impl Prec {
    fn of_binary(tier: u8) -> Prec {
        match tier {
            1 => Prec::Or,
            2 => Prec::And,
            3 => Prec::Equality,
            4 => Prec::Relational,
            5 => Prec::Additive,
            _ => Prec::Multiplicative,
        }
    }

    fn tighter(self) -> Prec {
        match self {
            Prec::Ternary => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::Equality,
            Prec::Equality => Prec::Relational,
            Prec::Relational => Prec::Additive,
            Prec::Additive => Prec::Multiplicative,
            Prec::Multiplicative => Prec::Unary,
            Prec::Unary => Prec::Await,
            Prec::Await => Prec::Postfix,
            Prec::Postfix | Prec::Atom => Prec::Atom,
        }
    }
}

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    for (i, module) in program.modules.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        fmt_module(&mut out, module);
    }
    out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, expr, Prec::Ternary);
    out
}

pub fn format_type(ty: &TypeRef) -> String {
    let mut out = String::new();
    fmt_type(&mut out, ty);
    out
}

fn indent_line(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
}

fn fmt_module(out: &mut String, module: &ModuleDecl) {
    out.push_str("module ");
    out.push_str(&module.name.node);
    out.push_str(":\n");
    for (i, item) in module.members.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match item {
            Item::Struct(s) => fmt_struct(out, s),
            Item::Enum(e) => fmt_enum(out, e),
            Item::Const(c) => fmt_const(out, c),
            Item::Fn(f) => fmt_fn(out, f),
        }
    }
}

fn fmt_struct(out: &mut String, s: &StructDecl) {
    indent_line(out, 1);
    out.push_str("struct ");
    out.push_str(&s.name.node);
    out.push_str(":\n");
    for field in &s.fields {
        indent_line(out, 2);
        out.push_str(&field.name.node);
        out.push_str(": ");
        fmt_type(out, &field.ty);
        out.push('\n');
    }
}

fn fmt_enum(out: &mut String, e: &EnumDecl) {
    indent_line(out, 1);
    out.push_str("enum ");
    out.push_str(&e.name.node);
    out.push_str(":\n");
    for v in &e.variants {
        indent_line(out, 2);
        out.push_str(&v.name.node);
        if !v.payload.is_empty() {
            out.push('(');
            fmt_comma_types(out, &v.payload);
            out.push(')');
        }
        out.push('\n');
    }
}

fn fmt_const(out: &mut String, c: &ConstDecl) {
    indent_line(out, 1);
    out.push_str("const ");
    out.push_str(&c.name.node);
    out.push_str(": ");
    fmt_type(out, &c.ty);
    out.push_str(" = ");
    fmt_expr(out, &c.value, Prec::Ternary);
    out.push('\n');
}

fn fmt_fn(out: &mut String, f: &FnDecl) {
    indent_line(out, 1);
    if f.is_async {
        out.push_str("async ");
    }
    out.push_str("fn ");
    out.push_str(&f.name.node);
    out.push('(');
    for (i, p) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&p.name.node);
        out.push_str(": ");
        fmt_type(out, &p.ty);
    }
    out.push(')');
    if let Some(ret) = &f.ret {
        out.push_str(" -> ");
        fmt_type(out, ret);
    }
    out.push_str(":\n");
    fmt_block(out, 2, &f.body);
}

fn fmt_comma_types(out: &mut String, tys: &[TypeRef]) {
    for (i, t) in tys.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_type(out, t);
    }
}

fn fmt_type(out: &mut String, ty: &TypeRef) {
    match &ty.kind {
        TypeRefKind::Named { path, args } => {
            for (i, seg) in path.iter().enumerate() {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(&seg.node);
            }
            if !args.is_empty() {
                out.push('<');
                fmt_comma_types(out, args);
                out.push('>');
            }
        }
        TypeRefKind::Array(elem) => {
            out.push('[');
            fmt_type(out, elem);
            out.push(']');
        }
        TypeRefKind::Function { params, ret } => {
            out.push_str("fn(");
            fmt_comma_types(out, params);
            out.push(')');
            if let Some(r) = ret {
                out.push_str(" -> ");
                fmt_type(out, r);
            }
        }
    }
}

fn fmt_block(out: &mut String, indent: usize, block: &Block) {
    for stmt in &block.stmts {
        fmt_stmt(out, indent, stmt);
    }
}

fn fmt_stmt(out: &mut String, indent: usize, stmt: &Stmt) {
    match stmt {
        Stmt::Let(s) => {
            indent_line(out, indent);
            out.push_str("let ");
            if s.mutable {
                out.push_str("mut ");
            }
            out.push_str(&s.name.node);
            if let Some(ty) = &s.ty {
                out.push_str(": ");
                fmt_type(out, ty);
            }
            out.push_str(" = ");
            fmt_expr(out, &s.value, Prec::Ternary);
            out.push('\n');
        }
        Stmt::Assign(s) => {
            indent_line(out, indent);
            fmt_expr(out, &s.target, Prec::Ternary);
            out.push_str(" = ");
            fmt_expr(out, &s.value, Prec::Ternary);
            out.push('\n');
        }
        Stmt::Return(s) => {
            indent_line(out, indent);
            out.push_str("return");
            if let Some(v) = &s.value {
                out.push(' ');
                fmt_expr(out, v, Prec::Ternary);
            }
            out.push('\n');
        }
        Stmt::If(s) => {
            indent_line(out, indent);
            out.push_str("if ");
            fmt_if_tail(out, indent, s);
        }
        Stmt::For(s) => {
            indent_line(out, indent);
            out.push_str("for ");
            out.push_str(&s.var.node);
            out.push_str(" in ");
            match &s.iter {
                ForIter::Range { start, end } => {
                    fmt_expr(out, start, Prec::Ternary);
                    out.push_str("..");
                    fmt_expr(out, end, Prec::Ternary);
                }
                ForIter::Each(e) => fmt_expr(out, e, Prec::Ternary),
            }
            out.push_str(":\n");
            fmt_block(out, indent + 1, &s.body);
        }
        Stmt::While(s) => {
            indent_line(out, indent);
            out.push_str("while ");
            fmt_expr(out, &s.cond, Prec::Ternary);
            out.push_str(":\n");
            fmt_block(out, indent + 1, &s.body);
        }
        Stmt::Expr(e) => {
            indent_line(out, indent);
            fmt_expr(out, e, Prec::Ternary);
            out.push('\n');
        }
    }
}

/// Condition and branches after the `if `/`elif ` keyword. An else block
/// holding exactly one `if` is printed as an `elif` chain.
fn fmt_if_tail(out: &mut String, indent: usize, s: &IfStmt) {
    fmt_expr(out, &s.cond, Prec::Ternary);
    out.push_str(":\n");
    fmt_block(out, indent + 1, &s.then_block);

    let Some(else_block) = &s.else_block else {
        return;
    };
    if let [Stmt::If(nested)] = else_block.stmts.as_slice() {
        indent_line(out, indent);
        out.push_str("elif ");
        fmt_if_tail(out, indent, nested);
        return;
    }
    indent_line(out, indent);
    out.push_str("else:\n");
    fmt_block(out, indent + 1, else_block);
}

fn fmt_float(out: &mut String, f: f64) {
    let text = f.to_string();
    out.push_str(&text);
    if !text.contains('.') {
        out.push_str(".0");
    }
}

fn fmt_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        if ch == '"' {
            out.push_str("\\\"");
        } else {
            out.push(ch);
        }
    }
    out.push('"');
}

fn fmt_args(out: &mut String, args: &[Expr]) {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_expr(out, a, Prec::Ternary);
    }
}

fn fmt_expr(out: &mut String, expr: &Expr, min: Prec) {
    let my = expr_prec(expr);
    let parens = my < min;
    if parens {
        out.push('(');
    }

    match &expr.kind {
        ExprKind::IntLit(n) => out.push_str(&n.to_string()),
        ExprKind::FloatLit(f) => fmt_float(out, *f),
        ExprKind::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        ExprKind::StringLit(s) => fmt_string(out, s),
        ExprKind::ArrayLit(items) => {
            out.push('[');
            fmt_args(out, items);
            out.push(']');
        }
        ExprKind::Ident(id) => out.push_str(&id.node),
        ExprKind::Member { base, member } => {
            fmt_expr(out, base, Prec::Postfix);
            out.push('.');
            out.push_str(&member.node);
        }
        ExprKind::Call { callee, args } => {
            fmt_expr(out, callee, Prec::Postfix);
            out.push('(');
            fmt_args(out, args);
            out.push(')');
        }
        ExprKind::Index { base, index } => {
            fmt_expr(out, base, Prec::Postfix);
            out.push('[');
            fmt_expr(out, index, Prec::Ternary);
            out.push(']');
        }
        ExprKind::Unary { op, expr: inner } => {
            out.push_str(op.symbol());
            // `- -x` must not be glued into something the lexer reads differently.
            if matches!(op, UnaryOp::Neg | UnaryOp::Plus) && starts_with_sign(inner) {
                out.push(' ');
            }
            fmt_expr(out, inner, Prec::Unary);
        }
        ExprKind::Binary { left, op, right } => {
            fmt_expr(out, left, my);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_expr(out, right, my.tighter());
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            fmt_expr(out, cond, Prec::Or);
            out.push_str(" ? ");
            fmt_expr(out, then_expr, Prec::Ternary);
            out.push_str(" : ");
            fmt_expr(out, else_expr, Prec::Ternary);
        }
        ExprKind::Await(inner) => {
            out.push_str("await ");
            fmt_expr(out, inner, Prec::Await);
        }
    }

    if parens {
        out.push(')');
    }
}

fn starts_with_sign(expr: &Expr) -> bool {
    matches!(
        &expr.kind,
        ExprKind::Unary {
            op: UnaryOp::Neg | UnaryOp::Plus,
            ..
        }
    )
}

fn expr_prec(expr: &Expr) -> Prec {
    match &expr.kind {
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::ArrayLit(_)
        | ExprKind::Ident(_) => Prec::Atom,
        ExprKind::Member { .. } | ExprKind::Call { .. } | ExprKind::Index { .. } => Prec::Postfix,
        ExprKind::Unary { .. } => Prec::Unary,
        ExprKind::Await(_) => Prec::Await,
        ExprKind::Binary { op, .. } => Prec::of_binary(op.precedence()),
        ExprKind::Ternary { .. } => Prec::Ternary,
    }
}

#[cfg(test)]
mod tests {
    use crate::{format_expr, parse_expr};

    fn roundtrip(src: &str) -> String {
        format_expr(&parse_expr(src).unwrap())
    }

    #[test]
    fn parens_only_where_needed() {
        assert_eq!(roundtrip("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(roundtrip("1 + (2 * 3)"), "1 + 2 * 3");
        assert_eq!(roundtrip("a - (b - c)"), "a - (b - c)");
        assert_eq!(roundtrip("(a - b) - c"), "a - b - c");
    }

    #[test]
    fn ternary_is_right_associative() {
        assert_eq!(roundtrip("a ? b : (c ? d : e)"), "a ? b : c ? d : e");
        assert_eq!(roundtrip("(a ? b : c) ? d : e"), "(a ? b : c) ? d : e");
    }

    #[test]
    fn unary_await_and_postfix() {
        assert_eq!(roundtrip("-(await f(x)).y"), "-(await f(x)).y");
        assert_eq!(roundtrip("-await f(x)"), "-await f(x)");
        assert_eq!(roundtrip("- -x"), "- -x");
        assert_eq!(roundtrip("!(a && b)"), "!(a && b)");
    }

    #[test]
    fn floats_keep_a_fraction() {
        assert_eq!(roundtrip("2.0"), "2.0");
        assert_eq!(roundtrip("0.5"), "0.5");
    }
}
