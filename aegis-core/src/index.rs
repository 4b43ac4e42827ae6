#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use aegis_ast::{ConstDecl, Ident, Item, Program, Span, TypeRef};
use aegis_ir::Constant;

use crate::consteval::ConstEvaluator;
use crate::error::SemanticError;
use crate::types::{resolve_type_ref, DeclRef, Type};

#[derive(Clone, Debug)]
pub struct StructInfo {
    pub span: Span,
    pub fields: Vec<(String, Type)>,
}

impl StructInfo {
    pub fn field(&self, name: &str) -> Option<(usize, &Type)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n == name)
            .map(|(i, (_, t))| (i, t))
    }
}

#[derive(Clone, Debug)]
pub struct VariantInfo {
    pub name: String,
    pub payload: Vec<Type>,
}

#[derive(Clone, Debug)]
pub struct EnumInfo {
    pub span: Span,
    pub variants: Vec<VariantInfo>,
}

impl EnumInfo {
    /// Tag and declaration of a variant; tags follow declaration order.
    pub fn variant(&self, name: &str) -> Option<(u32, &VariantInfo)> {
        self.variants
            .iter()
            .enumerate()
            .find(|(_, v)| v.name == name)
            .map(|(i, v)| (i as u32, v))
    }
}

#[derive(Clone, Debug)]
pub struct FnSig {
    pub span: Span,
    pub is_async: bool,
    pub params: Vec<(String, Type)>,
    pub ret: Type,
}

impl FnSig {
    pub fn as_type(&self) -> Type {
        Type::Function {
            params: self.params.iter().map(|(_, t)| t.clone()).collect(),
            ret: Box::new(self.ret.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConstInfo {
    pub span: Span,
    pub ty: Type,
    /// `None` when evaluation failed; the error was already reported.
    pub value: Option<Constant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeclKind {
    Struct,
    Enum,
    Fn,
    Const,
}

/// A module-level name as seen from an expression.
#[derive(Clone, Copy, Debug)]
pub enum Member<'a> {
    Struct(&'a StructInfo),
    Enum(&'a EnumInfo),
    Fn(&'a FnSig),
    Const(&'a ConstInfo),
}

#[derive(Clone, Debug, Default)]
pub struct ModuleSymbols {
    /// Index of the compilation unit that declares the module.
    pub unit: usize,
    pub structs: HashMap<String, StructInfo>,
    pub enums: HashMap<String, EnumInfo>,
    pub functions: HashMap<String, FnSig>,
    pub consts: HashMap<String, ConstInfo>,
}

/// Declarations of every module across all units, built once after parsing.
#[derive(Clone, Debug, Default)]
pub struct GlobalIndex {
    modules: HashMap<String, ModuleSymbols>,
}

impl GlobalIndex {
    pub fn module(&self, name: &str) -> Option<&ModuleSymbols> {
        self.modules.get(name)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn member(&self, module: &str, name: &str) -> Option<Member<'_>> {
        let m = self.modules.get(module)?;
        if let Some(s) = m.structs.get(name) {
            return Some(Member::Struct(s));
        }
        if let Some(e) = m.enums.get(name) {
            return Some(Member::Enum(e));
        }
        if let Some(f) = m.functions.get(name) {
            return Some(Member::Fn(f));
        }
        m.consts.get(name).map(Member::Const)
    }

    pub fn struct_info(&self, decl: &DeclRef) -> Option<&StructInfo> {
        self.modules.get(&decl.module)?.structs.get(&decl.name)
    }

    pub fn enum_info(&self, decl: &DeclRef) -> Option<&EnumInfo> {
        self.modules.get(&decl.module)?.enums.get(&decl.name)
    }

    /// Resolves a type written inside `module`, e.g. a `let` annotation.
    pub fn resolve_type(&self, module: &str, tr: &TypeRef) -> Result<Type, SemanticError> {
        resolve_path(
            &|m| self.has_module(m),
            &|m, n| {
                self.member(m, n).map(|member| match member {
                    Member::Struct(_) => DeclKind::Struct,
                    Member::Enum(_) => DeclKind::Enum,
                    Member::Fn(_) => DeclKind::Fn,
                    Member::Const(_) => DeclKind::Const,
                })
            },
            module,
            tr,
        )
    }

    /// Builds the index for `units` (in unit order). Errors are returned with
    /// the index of the unit they belong to.
    pub fn build(units: &[&Program]) -> (GlobalIndex, Vec<(usize, SemanticError)>) {
        let mut errors = Vec::new();

        // Pass 1: names, so types can refer to declarations in any order.
        let mut names: HashMap<String, HashMap<String, DeclKind>> = HashMap::new();
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut accepted: Vec<Vec<bool>> = Vec::with_capacity(units.len());
        for (unit, program) in units.iter().enumerate() {
            let mut keep = Vec::with_capacity(program.modules.len());
            for module in &program.modules {
                if owners.contains_key(&module.name.node) {
                    errors.push((
                        unit,
                        SemanticError::name(
                            module.name.span,
                            format!("module `{}` is declared more than once", module.name.node),
                        ),
                    ));
                    keep.push(false);
                    continue;
                }
                owners.insert(module.name.node.clone(), unit);
                keep.push(true);

                let table = names.entry(module.name.node.clone()).or_default();
                for item in &module.members {
                    let kind = match item {
                        Item::Struct(_) => DeclKind::Struct,
                        Item::Enum(_) => DeclKind::Enum,
                        Item::Fn(_) => DeclKind::Fn,
                        Item::Const(_) => DeclKind::Const,
                    };
                    let name = item.name();
                    if table.contains_key(&name.node) {
                        errors.push((
                            unit,
                            SemanticError::name(
                                name.span,
                                format!(
                                    "`{}` is already declared in module `{}`",
                                    name.node, module.name.node
                                ),
                            ),
                        ));
                        continue;
                    }
                    table.insert(name.node.clone(), kind);
                }
            }
            accepted.push(keep);
        }

        // Pass 2: resolve declared types.
        let mut index = GlobalIndex::default();
        let mut const_decls: HashMap<(String, String), (usize, &ConstDecl)> = HashMap::new();
        for (unit, program) in units.iter().enumerate() {
            for (module, keep) in program.modules.iter().zip(&accepted[unit]) {
                if !keep {
                    continue;
                }
                let mname = module.name.node.as_str();
                let mut syms = ModuleSymbols {
                    unit,
                    ..ModuleSymbols::default()
                };
                let mut seen: HashSet<&str> = HashSet::new();
                let resolve = |tr: &TypeRef, errors: &mut Vec<(usize, SemanticError)>| {
                    match resolve_in(&names, mname, tr) {
                        Ok(t) => t,
                        Err(e) => {
                            errors.push((unit, e));
                            Type::Error
                        }
                    }
                };

                for item in &module.members {
                    // Only the first declaration of a name is indexed.
                    if !seen.insert(item.name().node.as_str()) {
                        continue;
                    }
                    match item {
                        Item::Struct(s) => {
                            let mut fields: Vec<(String, Type)> = Vec::new();
                            for f in &s.fields {
                                let ty = resolve(&f.ty, &mut errors);
                                if fields.iter().any(|(n, _)| *n == f.name.node) {
                                    errors.push((
                                        unit,
                                        SemanticError::name(
                                            f.name.span,
                                            format!(
                                                "field `{}` is declared twice in struct `{}`",
                                                f.name.node, s.name.node
                                            ),
                                        ),
                                    ));
                                    continue;
                                }
                                fields.push((f.name.node.clone(), ty));
                            }
                            syms.structs.insert(
                                s.name.node.clone(),
                                StructInfo {
                                    span: s.span,
                                    fields,
                                },
                            );
                        }
                        Item::Enum(e) => {
                            let mut variants: Vec<VariantInfo> = Vec::new();
                            for v in &e.variants {
                                let payload = v
                                    .payload
                                    .iter()
                                    .map(|t| resolve(t, &mut errors))
                                    .collect();
                                if variants.iter().any(|x| x.name == v.name.node) {
                                    errors.push((
                                        unit,
                                        SemanticError::name(
                                            v.name.span,
                                            format!(
                                                "variant `{}` is declared twice in enum `{}`",
                                                v.name.node, e.name.node
                                            ),
                                        ),
                                    ));
                                    continue;
                                }
                                variants.push(VariantInfo {
                                    name: v.name.node.clone(),
                                    payload,
                                });
                            }
                            syms.enums.insert(
                                e.name.node.clone(),
                                EnumInfo {
                                    span: e.span,
                                    variants,
                                },
                            );
                        }
                        Item::Fn(f) => {
                            let params = f
                                .params
                                .iter()
                                .map(|p| (p.name.node.clone(), resolve(&p.ty, &mut errors)))
                                .collect();
                            let ret = match &f.ret {
                                Some(t) => resolve(t, &mut errors),
                                None => Type::Void,
                            };
                            syms.functions.insert(
                                f.name.node.clone(),
                                FnSig {
                                    span: f.span,
                                    is_async: f.is_async,
                                    params,
                                    ret,
                                },
                            );
                        }
                        Item::Const(c) => {
                            let ty = resolve(&c.ty, &mut errors);
                            if !matches!(
                                ty,
                                Type::Int | Type::Float | Type::Bool | Type::String | Type::Error
                            ) {
                                errors.push((
                                    unit,
                                    SemanticError::ty(
                                        c.ty.span,
                                        format!(
                                            "constant `{}` has type `{ty}`; constants must be int, float, bool or string",
                                            c.name.node
                                        ),
                                    ),
                                ));
                            }
                            syms.consts.insert(
                                c.name.node.clone(),
                                ConstInfo {
                                    span: c.span,
                                    ty,
                                    value: None,
                                },
                            );
                            const_decls.insert((mname.to_string(), c.name.node.clone()), (unit, c));
                        }
                    }
                }
                index.modules.insert(mname.to_string(), syms);
            }
        }

        // Pass 3: evaluate constants, following references across modules.
        let mut eval = ConstEvaluator::new(&const_decls);
        let mut keys: Vec<&(String, String)> = const_decls.keys().collect();
        keys.sort();
        for key in keys {
            eval.evaluate(key);
        }
        let (values, const_errors) = eval.finish();
        errors.extend(const_errors);
        for ((module, name), value) in values {
            let Some(info) = index
                .modules
                .get_mut(&module)
                .and_then(|m| m.consts.get_mut(&name))
            else {
                continue;
            };
            if let Some(v) = value {
                let vt = const_type(&v);
                if info.ty.is_error() || vt == info.ty {
                    info.value = Some(v);
                    continue;
                }
                // Non-primitive declared types were already rejected above.
                if !info.ty.is_primitive() {
                    continue;
                }
                if let Some((unit, decl)) = const_decls.get(&(module.clone(), name.clone())) {
                    errors.push((
                        *unit,
                        SemanticError::ty(
                            decl.value.span,
                            format!(
                                "mismatched types: constant `{name}` is declared `{}` but its value is `{vt}`",
                                info.ty
                            ),
                        ),
                    ));
                }
            }
        }

        (index, errors)
    }
}

fn const_type(c: &Constant) -> Type {
    match c {
        Constant::Int(_) => Type::Int,
        Constant::Float(_) => Type::Float,
        Constant::Bool(_) => Type::Bool,
        Constant::Str(_) => Type::String,
    }
}

fn resolve_in(
    names: &HashMap<String, HashMap<String, DeclKind>>,
    current: &str,
    tr: &TypeRef,
) -> Result<Type, SemanticError> {
    resolve_path(
        &|m| names.contains_key(m),
        &|m, n| names.get(m).and_then(|t| t.get(n)).copied(),
        current,
        tr,
    )
}

fn resolve_path(
    has_module: &dyn Fn(&str) -> bool,
    kind_of: &dyn Fn(&str, &str) -> Option<DeclKind>,
    current: &str,
    tr: &TypeRef,
) -> Result<Type, SemanticError> {
    resolve_type_ref(tr, &mut |path: &[Ident], span: Span| {
        let (module, name) = match path {
            [name] => (current, name),
            [module, name] => {
                if !has_module(&module.node) {
                    return Err(SemanticError::name(
                        module.span,
                        format!("unknown module `{}`", module.node),
                    ));
                }
                (module.node.as_str(), name)
            }
            _ => {
                return Err(SemanticError::name(
                    span,
                    "type paths have at most two segments: `Module.Type`",
                ));
            }
        };
        match kind_of(module, &name.node) {
            Some(DeclKind::Struct | DeclKind::Enum) => {
                Ok(Type::Named(DeclRef::new(module, name.node.clone())))
            }
            Some(DeclKind::Fn | DeclKind::Const) => Err(SemanticError::ty(
                name.span,
                format!("`{}` is a value, not a type", name.node),
            )),
            None if module == current => Err(SemanticError::name(
                name.span,
                format!("unknown type `{}`", name.node),
            )),
            None => Err(SemanticError::name(
                name.span,
                format!("module `{module}` has no type `{}`", name.node),
            )),
        }
    })
}
