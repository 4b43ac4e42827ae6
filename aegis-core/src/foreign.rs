#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use aegis_ast::TypeRefKind;
use miette::Diagnostic;
use thiserror::Error;

use crate::error::SemanticError;
use crate::types::{resolve_type_ref, Type};

/// Signature of a function implemented outside Aegis. Only the types are
/// known; calls are checked against them and lowered as foreign calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignFn {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl ForeignFn {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }

    pub fn as_type(&self) -> Type {
        Type::Function {
            params: self.params.clone(),
            ret: Box::new(self.ret.clone()),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("invalid foreign declaration `{name}`: {message}")]
#[diagnostic(code(aegis::config))]
pub struct ForeignDeclError {
    pub name: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForeignTable {
    sigs: BTreeMap<String, ForeignFn>,
}

impl ForeignTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The runtime's I/O and string helpers.
    pub fn standard() -> Self {
        use Type::{Bool, Int, String as Str, Void};

        let mut t = Self::empty();
        t.insert("read_file", ForeignFn::new(vec![Str], Type::option(Str)));
        t.insert("write_file", ForeignFn::new(vec![Str, Str], Bool));
        t.insert("http_get", ForeignFn::new(vec![Str], Str));
        t.insert("http_post", ForeignFn::new(vec![Str, Str], Str));
        t.insert("current_timestamp", ForeignFn::new(vec![], Int));
        t.insert("format_date", ForeignFn::new(vec![Int, Str], Str));
        t.insert("print", ForeignFn::new(vec![Str], Void));
        t.insert("length", ForeignFn::new(vec![Str], Int));
        t.insert("concat", ForeignFn::new(vec![Str, Str], Str));
        t
    }

    pub fn insert(&mut self, name: impl Into<String>, sig: ForeignFn) -> Option<ForeignFn> {
        self.sigs.insert(name.into(), sig)
    }

    /// Adds a signature written as an Aegis function type, e.g.
    /// `fn(string, int) -> bool`. Only built-in types may appear.
    pub fn declare(&mut self, name: &str, signature: &str) -> Result<(), ForeignDeclError> {
        let fail = |message: String| ForeignDeclError {
            name: name.to_string(),
            message,
        };
        let valid_name = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(fail("not an identifier".to_string()));
        }

        let tr = aegis_parse::parse_type(signature).map_err(|e| fail(e.to_string()))?;
        if !matches!(tr.kind, TypeRefKind::Function { .. }) {
            return Err(fail(format!("expected a function type, found `{signature}`")));
        }
        let ty = resolve_type_ref(&tr, &mut |path, span| {
            let name: Vec<&str> = path.iter().map(|p| p.node.as_str()).collect();
            Err(SemanticError::name(
                span,
                format!("`{}` is not a built-in type", name.join(".")),
            ))
        })
        .map_err(|e| fail(e.message))?;

        let Type::Function { params, ret } = ty else {
            return Err(fail("expected a function type".to_string()));
        };
        self.insert(name, ForeignFn::new(params, *ret));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ForeignFn> {
        self.sigs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ForeignFn)> {
        self.sigs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_the_io_signatures() {
        let t = ForeignTable::standard();
        assert_eq!(t.len(), 9);
        let read = t.get("read_file").unwrap();
        assert_eq!(read.params, vec![Type::String]);
        assert_eq!(read.ret, Type::option(Type::String));
        assert_eq!(t.get("current_timestamp").unwrap().params.len(), 0);
    }

    #[test]
    fn declarations_use_aegis_type_syntax() {
        let mut t = ForeignTable::empty();
        t.declare("sleep", "fn(int) -> Result<bool, string>").unwrap();
        let sleep = t.get("sleep").unwrap();
        assert_eq!(sleep.params, vec![Type::Int]);
        assert_eq!(sleep.ret, Type::result(Type::Bool, Type::String));

        t.declare("beep", "fn()").unwrap();
        assert_eq!(t.get("beep").unwrap().ret, Type::Void);
    }

    #[test]
    fn bad_declarations_are_rejected() {
        let mut t = ForeignTable::empty();
        assert!(t.declare("x", "int").is_err());
        assert!(t.declare("x", "fn(User) -> int").is_err());
        assert!(t.declare("x", "fn(Option<int, int>)").is_err());
        assert!(t.declare("1x", "fn()").is_err());
    }
}
