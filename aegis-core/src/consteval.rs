#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use aegis_ast::{BinOp, ConstDecl, Expr, ExprKind, Span, UnaryOp};
use aegis_ir::Constant;

use crate::error::SemanticError;

type Key = (String, String);

/// Evaluates `const` initializers. Only literals, operators, ternaries and
/// references to other constants are allowed.
pub(crate) struct ConstEvaluator<'a> {
    decls: &'a HashMap<Key, (usize, &'a ConstDecl)>,
    values: HashMap<Key, Option<Constant>>,
    in_progress: HashSet<Key>,
    errors: Vec<(usize, SemanticError)>,
}

impl<'a> ConstEvaluator<'a> {
    pub(crate) fn new(decls: &'a HashMap<Key, (usize, &'a ConstDecl)>) -> Self {
        Self {
            decls,
            values: HashMap::new(),
            in_progress: HashSet::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (HashMap<Key, Option<Constant>>, Vec<(usize, SemanticError)>) {
        (self.values, self.errors)
    }

    /// Value of a constant; `None` once an error has been reported for it.
    pub(crate) fn evaluate(&mut self, key: &Key) -> Option<Constant> {
        if let Some(v) = self.values.get(key) {
            return v.clone();
        }
        let (unit, decl) = *self.decls.get(key)?;
        if !self.in_progress.insert(key.clone()) {
            self.errors.push((
                unit,
                SemanticError::ty(
                    decl.name.span,
                    format!("constant `{}` depends on itself", decl.name.node),
                ),
            ));
            self.values.insert(key.clone(), None);
            return None;
        }

        let result = self.eval(&key.0, &decl.value);
        self.in_progress.remove(key);
        let value = match result {
            Ok(v) => Some(v),
            Err(Some(e)) => {
                self.errors.push((unit, e));
                None
            }
            Err(None) => None,
        };
        // A cycle may already have recorded this key.
        self.values.entry(key.clone()).or_insert(value).clone()
    }

    /// `Err(None)` means a referenced constant failed and already reported.
    fn eval(&mut self, module: &str, e: &Expr) -> Result<Constant, Option<SemanticError>> {
        match &e.kind {
            ExprKind::IntLit(n) => Ok(Constant::Int(*n)),
            ExprKind::FloatLit(x) => Ok(Constant::Float(*x)),
            ExprKind::BoolLit(b) => Ok(Constant::Bool(*b)),
            ExprKind::StringLit(s) => Ok(Constant::Str(s.clone())),
            ExprKind::Ident(name) => self.reference(module, &name.node, e.span),
            ExprKind::Member { base, member } => match base.as_ident() {
                Some(m) => self.reference(&m.node, &member.node, e.span),
                None => Err(Some(not_constant(e.span))),
            },
            ExprKind::Unary { op, expr } => {
                let v = self.eval(module, expr)?;
                unary(*op, v, e.span).map_err(Some)
            }
            ExprKind::Binary { left, op, right } => {
                let l = self.eval(module, left)?;
                let r = self.eval(module, right)?;
                binary(*op, l, r, e.span).map_err(Some)
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.eval(module, cond)?;
                let t = self.eval(module, then_expr)?;
                let f = self.eval(module, else_expr)?;
                let Constant::Bool(c) = c else {
                    return Err(Some(SemanticError::ty(
                        cond.span,
                        format!("condition must be `bool`, found `{}`", c.ty()),
                    )));
                };
                if t.ty() != f.ty() {
                    return Err(Some(SemanticError::ty(
                        e.span,
                        format!(
                            "ternary branches have different types: `{}` and `{}`",
                            t.ty(),
                            f.ty()
                        ),
                    )));
                }
                Ok(if c { t } else { f })
            }
            ExprKind::ArrayLit(_)
            | ExprKind::Call { .. }
            | ExprKind::Index { .. }
            | ExprKind::Await(_) => Err(Some(not_constant(e.span))),
        }
    }

    fn reference(
        &mut self,
        module: &str,
        name: &str,
        span: Span,
    ) -> Result<Constant, Option<SemanticError>> {
        let key = (module.to_string(), name.to_string());
        if !self.decls.contains_key(&key) {
            return Err(Some(
                SemanticError::ty(
                    span,
                    format!("`{name}` is not a constant"),
                )
                .with_help("const initializers may only refer to other constants"),
            ));
        }
        self.evaluate(&key).ok_or(None)
    }
}

fn not_constant(span: Span) -> SemanticError {
    SemanticError::ty(span, "const initializer must be a compile-time constant")
        .with_help("use literals, operators and other constants")
}

fn mismatch(op: &str, l: &Constant, r: &Constant, span: Span) -> SemanticError {
    SemanticError::ty(
        span,
        format!(
            "operator `{op}` cannot be applied to `{}` and `{}`",
            l.ty(),
            r.ty()
        ),
    )
}

fn overflow(span: Span) -> SemanticError {
    SemanticError::ty(span, "constant arithmetic overflows `int`")
}

fn unary(op: UnaryOp, v: Constant, span: Span) -> Result<Constant, SemanticError> {
    match (op, v) {
        (UnaryOp::Plus, v @ (Constant::Int(_) | Constant::Float(_))) => Ok(v),
        (UnaryOp::Neg, Constant::Int(n)) => n.checked_neg().map(Constant::Int).ok_or_else(|| overflow(span)),
        (UnaryOp::Neg, Constant::Float(x)) => Ok(Constant::Float(-x)),
        (UnaryOp::Not, Constant::Bool(b)) => Ok(Constant::Bool(!b)),
        (op, v) => Err(SemanticError::ty(
            span,
            format!("operator `{}` cannot be applied to `{}`", op.symbol(), v.ty()),
        )),
    }
}

fn binary(op: BinOp, l: Constant, r: Constant, span: Span) -> Result<Constant, SemanticError> {
    use Constant::{Bool, Float, Int, Str};

    let sym = op.symbol();
    Ok(match (op, &l, &r) {
        (BinOp::Add, Str(a), Str(b)) => Str(format!("{a}{b}")),
        (BinOp::Div | BinOp::Rem, Int(_), Int(0)) => {
            return Err(SemanticError::ty(span, "division by zero in constant expression"));
        }
        (BinOp::Add, Int(a), Int(b)) => Int(a.checked_add(*b).ok_or_else(|| overflow(span))?),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.checked_sub(*b).ok_or_else(|| overflow(span))?),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.checked_mul(*b).ok_or_else(|| overflow(span))?),
        (BinOp::Div, Int(a), Int(b)) => Int(a.checked_div(*b).ok_or_else(|| overflow(span))?),
        (BinOp::Rem, Int(a), Int(b)) => Int(a.checked_rem(*b).ok_or_else(|| overflow(span))?),
        (BinOp::Add, Float(a), Float(b)) => Float(a + b),
        (BinOp::Sub, Float(a), Float(b)) => Float(a - b),
        (BinOp::Mul, Float(a), Float(b)) => Float(a * b),
        (BinOp::Div, Float(a), Float(b)) => Float(a / b),
        (BinOp::Rem, Float(a), Float(b)) => Float(a % b),
        (BinOp::Lt, Int(a), Int(b)) => Bool(a < b),
        (BinOp::Le, Int(a), Int(b)) => Bool(a <= b),
        (BinOp::Gt, Int(a), Int(b)) => Bool(a > b),
        (BinOp::Ge, Int(a), Int(b)) => Bool(a >= b),
        (BinOp::Lt, Float(a), Float(b)) => Bool(a < b),
        (BinOp::Le, Float(a), Float(b)) => Bool(a <= b),
        (BinOp::Gt, Float(a), Float(b)) => Bool(a > b),
        (BinOp::Ge, Float(a), Float(b)) => Bool(a >= b),
        (BinOp::Eq | BinOp::Ne, a, b) if a.ty() == b.ty() => {
            let same = a == b;
            Bool(if op == BinOp::Eq { same } else { !same })
        }
        (BinOp::And, Bool(a), Bool(b)) => Bool(*a && *b),
        (BinOp::Or, Bool(a), Bool(b)) => Bool(*a || *b),
        _ => return Err(mismatch(sym, &l, &r, span)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_ast::Item;

    fn eval_all(src: &str) -> (HashMap<Key, Option<Constant>>, Vec<String>) {
        let program = aegis_parse::parse_source(src).unwrap();
        let mut decls = HashMap::new();
        for module in &program.modules {
            for item in &module.members {
                if let Item::Const(c) = item {
                    decls.insert((module.name.node.clone(), c.name.node.clone()), (0, c));
                }
            }
        }
        let mut ev = ConstEvaluator::new(&decls);
        let mut keys: Vec<Key> = decls.keys().cloned().collect();
        keys.sort();
        for k in &keys {
            ev.evaluate(k);
        }
        let (values, errors) = ev.finish();
        (values, errors.into_iter().map(|(_, e)| e.message).collect())
    }

    fn key(m: &str, n: &str) -> Key {
        (m.to_string(), n.to_string())
    }

    #[test]
    fn folds_arithmetic_and_references() {
        let (values, errors) = eval_all(
            "module M:\n    const A: int = 10 * 2\n    const B: int = A + Other.C\nmodule Other:\n    const C: int = -1\n",
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(values[&key("M", "B")], Some(Constant::Int(19)));
    }

    #[test]
    fn cycles_and_division_by_zero_are_reported() {
        let (_, errors) = eval_all(
            "module M:\n    const A: int = B\n    const B: int = A\n    const Z: int = 1 / 0\n",
        );
        assert!(errors.iter().any(|e| e.contains("depends on itself")));
        assert!(errors.iter().any(|e| e.contains("division by zero")));
    }

    #[test]
    fn calls_are_not_constant() {
        let (_, errors) = eval_all("module M:\n    const T: int = current_timestamp()\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("compile-time constant"));
    }

    #[test]
    fn mixed_numeric_operands_are_rejected() {
        let (_, errors) = eval_all("module M:\n    const X: float = 1 + 2.0\n");
        assert!(errors[0].contains("cannot be applied to `int` and `float`"));
    }
}
