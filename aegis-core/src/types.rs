#![forbid(unsafe_code)]

use std::fmt;

use aegis_ast::{Ident, Span, TypeRef, TypeRefKind};
use aegis_ir as ir;

use crate::error::SemanticError;

/// A struct or enum declaration, identified by its module and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclRef {
    pub module: String,
    pub name: String,
}

impl DeclRef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeclRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    Named(DeclRef),
    Option(Box<Type>),
    Result(Box<Type>, Box<Type>),
    Array(Box<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
    /// Not yet known, e.g. the element of `[]` or the payload of `None`.
    Hole,
    /// Produced after an error was reported; compatible with everything so
    /// one mistake is reported once.
    Error,
}

impl Type {
    pub fn option(inner: Type) -> Self {
        Type::Option(Box::new(inner))
    }

    pub fn result(ok: Type, err: Type) -> Self {
        Type::Result(Box::new(ok), Box::new(err))
    }

    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Float | Type::Bool | Type::String | Type::Void
        )
    }

    /// Values of these types follow move semantics.
    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            Type::Named(_) | Type::Option(_) | Type::Result(..) | Type::Array(_)
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn contains_hole(&self) -> bool {
        match self {
            Type::Hole => true,
            Type::Option(t) | Type::Array(t) => t.contains_hole(),
            Type::Result(a, b) => a.contains_hole() || b.contains_hole(),
            Type::Function { params, ret } => {
                params.iter().any(Type::contains_hole) || ret.contains_hole()
            }
            _ => false,
        }
    }

    /// Unifies two types, filling holes from either side. `None` means the
    /// types are incompatible.
    pub fn unify(&self, other: &Type) -> Option<Type> {
        match (self, other) {
            (Type::Error, _) | (_, Type::Error) => Some(Type::Error),
            (Type::Hole, t) | (t, Type::Hole) => Some(t.clone()),
            (Type::Option(a), Type::Option(b)) => Some(Type::option(a.unify(b)?)),
            (Type::Array(a), Type::Array(b)) => Some(Type::array(a.unify(b)?)),
            (Type::Result(a1, b1), Type::Result(a2, b2)) => {
                Some(Type::result(a1.unify(a2)?, b1.unify(b2)?))
            }
            (
                Type::Function { params: p1, ret: r1 },
                Type::Function { params: p2, ret: r2 },
            ) => {
                if p1.len() != p2.len() {
                    return None;
                }
                let params = p1
                    .iter()
                    .zip(p2)
                    .map(|(a, b)| a.unify(b))
                    .collect::<Option<Vec<_>>>()?;
                Some(Type::Function {
                    params,
                    ret: Box::new(r1.unify(r2)?),
                })
            }
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    pub fn compatible(&self, other: &Type) -> bool {
        self.unify(other).is_some()
    }

    /// Converts a checked type for the IR. Holes only survive in values that
    /// are never observed (`[]` as a statement), so they become `void`.
    pub fn to_ir(&self) -> ir::Type {
        match self {
            Type::Int => ir::Type::Int,
            Type::Float => ir::Type::Float,
            Type::Bool => ir::Type::Bool,
            Type::String => ir::Type::String,
            Type::Void | Type::Hole | Type::Error => ir::Type::Void,
            Type::Named(d) => ir::Type::named(&d.module, &d.name),
            Type::Option(t) => ir::Type::Option(Box::new(t.to_ir())),
            Type::Result(a, b) => ir::Type::Result(Box::new(a.to_ir()), Box::new(b.to_ir())),
            Type::Array(t) => ir::Type::Array(Box::new(t.to_ir())),
            Type::Function { params, ret } => ir::Type::Function {
                params: params.iter().map(Type::to_ir).collect(),
                ret: Box::new(ret.to_ir()),
            },
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Bool => f.write_str("bool"),
            Type::String => f.write_str("string"),
            Type::Void => f.write_str("void"),
            Type::Named(d) => write!(f, "{}", d.name),
            Type::Option(t) => write!(f, "Option<{t}>"),
            Type::Result(a, b) => write!(f, "Result<{a}, {b}>"),
            Type::Array(t) => write!(f, "[{t}]"),
            Type::Function { params, ret } => {
                f.write_str("fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")?;
                if **ret != Type::Void {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
            Type::Hole => f.write_str("_"),
            Type::Error => f.write_str("{error}"),
        }
    }
}

/// Resolves a written type. Built-in names are handled here; everything else
/// goes through `named`, which sees the full dotted path.
pub(crate) fn resolve_type_ref(
    tr: &TypeRef,
    named: &mut dyn FnMut(&[Ident], Span) -> Result<Type, SemanticError>,
) -> Result<Type, SemanticError> {
    match &tr.kind {
        TypeRefKind::Array(elem) => Ok(Type::array(resolve_type_ref(elem, named)?)),
        TypeRefKind::Function { params, ret } => {
            let params = params
                .iter()
                .map(|p| resolve_type_ref(p, named))
                .collect::<Result<Vec<_>, _>>()?;
            let ret = match ret {
                Some(r) => resolve_type_ref(r, named)?,
                None => Type::Void,
            };
            Ok(Type::Function {
                params,
                ret: Box::new(ret),
            })
        }
        TypeRefKind::Named { path, args } => {
            let builtin = match path.as_slice() {
                [single] => match single.node.as_str() {
                    "int" => Some(Type::Int),
                    "float" => Some(Type::Float),
                    "bool" => Some(Type::Bool),
                    "string" => Some(Type::String),
                    "void" => Some(Type::Void),
                    "Option" | "Result" => {
                        let want = if single.node == "Option" { 1 } else { 2 };
                        if args.len() != want {
                            return Err(SemanticError::ty(
                                tr.span,
                                format!(
                                    "`{}` expects {want} type argument(s), found {}",
                                    single.node,
                                    args.len()
                                ),
                            ));
                        }
                        let mut resolved = args
                            .iter()
                            .map(|a| resolve_type_ref(a, named))
                            .collect::<Result<Vec<_>, _>>()?;
                        return Ok(if want == 1 {
                            Type::option(resolved.remove(0))
                        } else {
                            let err = resolved.remove(1);
                            Type::result(resolved.remove(0), err)
                        });
                    }
                    _ => None,
                },
                _ => None,
            };
            if !args.is_empty() {
                let name: Vec<&str> = path.iter().map(|p| p.node.as_str()).collect();
                return Err(SemanticError::ty(
                    tr.span,
                    format!(
                        "type `{}` does not take type arguments; only `Option` and `Result` are generic",
                        name.join(".")
                    ),
                ));
            }
            match builtin {
                Some(t) => Ok(t),
                None => named(path, tr.span),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holes_fill_from_either_side() {
        let none = Type::option(Type::Hole);
        let want = Type::option(Type::String);
        assert_eq!(none.unify(&want), Some(want.clone()));
        assert_eq!(want.unify(&none), Some(want));

        let ok = Type::result(Type::Int, Type::Hole);
        let err = Type::result(Type::Hole, Type::String);
        assert_eq!(ok.unify(&err), Some(Type::result(Type::Int, Type::String)));
    }

    #[test]
    fn no_numeric_coercion() {
        assert!(!Type::Int.compatible(&Type::Float));
        assert!(!Type::option(Type::Int).compatible(&Type::Int));
        assert!(Type::Error.compatible(&Type::Int));
    }

    #[test]
    fn linearity() {
        assert!(Type::Named(DeclRef::new("M", "User")).is_linear());
        assert!(Type::array(Type::Int).is_linear());
        assert!(!Type::String.is_linear());
        assert!(!Type::Function {
            params: vec![],
            ret: Box::new(Type::Void)
        }
        .is_linear());
    }
}
