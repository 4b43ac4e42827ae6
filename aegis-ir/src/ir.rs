#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use aegis_ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

/// A stack slot created by `Alloca`. Every local and parameter lives in one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub u32);

/// Fully resolved value type. Named types carry their declaring module.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    Named { module: String, name: String },
    Option(Box<Type>),
    Result(Box<Type>, Box<Type>),
    Array(Box<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    pub fn named(module: impl Into<String>, name: impl Into<String>) -> Self {
        Type::Named {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Option and Result get a layout entry per instantiation.
    pub fn builtin_layout(&self) -> Option<Layout> {
        match self {
            Type::Option(inner) => Some(Layout::Enum {
                variants: vec![
                    VariantLayout::new("None", OPTION_NONE, vec![]),
                    VariantLayout::new("Some", OPTION_SOME, vec![(**inner).clone()]),
                ],
            }),
            Type::Result(ok, err) => Some(Layout::Enum {
                variants: vec![
                    VariantLayout::new("Ok", RESULT_OK, vec![(**ok).clone()]),
                    VariantLayout::new("Err", RESULT_ERR, vec![(**err).clone()]),
                ],
            }),
            _ => None,
        }
    }
}

pub const OPTION_NONE: u32 = 0;
pub const OPTION_SOME: u32 = 1;
pub const RESULT_OK: u32 = 0;
pub const RESULT_ERR: u32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub enum Layout {
    /// Field types in declaration order.
    Struct { fields: Vec<(String, Type)> },
    /// A tag followed by the payload of the active variant.
    Enum { variants: Vec<VariantLayout> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariantLayout {
    pub name: String,
    pub tag: u32,
    pub payload: Vec<Type>,
}

impl VariantLayout {
    pub fn new(name: impl Into<String>, tag: u32, payload: Vec<Type>) -> Self {
        Self {
            name: name.into(),
            tag,
            payload,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int(_) => Type::Int,
            Constant::Float(_) => Type::Float,
            Constant::Bool(_) => Type::Bool,
            Constant::Str(_) => Type::String,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstIR {
    pub module: String,
    pub name: String,
    pub value: Constant,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForeignSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Everything lowered from one compilation unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleIR {
    pub unit: String,
    pub functions: Vec<FunctionIR>,
    /// Keyed by the type's printed name (`Mod.User`, `Option<int>`).
    pub types: BTreeMap<String, Layout>,
    pub constants: Vec<ConstIR>,
    pub foreign: BTreeMap<String, ForeignSig>,
}

impl ModuleIR {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            ..Self::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionIR> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FunctionIR> {
        self.functions.iter().filter(move |f| f.name == name)
    }

    /// Records layouts for `ty` and every built-in generic inside it.
    pub fn intern_layout(&mut self, ty: &Type) {
        match ty {
            Type::Option(inner) | Type::Array(inner) => self.intern_layout(inner),
            Type::Result(ok, err) => {
                self.intern_layout(ok);
                self.intern_layout(err);
            }
            Type::Function { params, ret } => {
                for p in params {
                    self.intern_layout(p);
                }
                self.intern_layout(ret);
            }
            _ => {}
        }
        if let Some(layout) = ty.builtin_layout() {
            self.types.entry(ty.to_string()).or_insert(layout);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionIR {
    pub module: String,
    pub name: String,
    pub span: Span,
    pub is_async: bool,
    pub params: Vec<Param>,
    pub ret: Type,
    pub entry: BlockId,
    pub blocks: Vec<BasicBlock>,
}

impl FunctionIR {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub slot: SlotId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: &'static str,
    pub insts: Vec<Inst>,
    pub term: Terminator,
    /// Set when the block contains a `Suspend`.
    pub suspend_boundary: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    Field(u32),
    Index(ValueId),
}

/// A slot plus a path of field/index steps into it.
#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    pub slot: SlotId,
    pub projections: Vec<Projection>,
}

impl Place {
    pub fn slot(slot: SlotId) -> Self {
        Self {
            slot,
            projections: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Callee {
    Function { module: String, name: String },
    Foreign(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Alloca { slot: SlotId, name: String },
    Load { place: Place },
    Store { place: Place, value: ValueId },
    Const(Constant),
    /// Address of a declared function used as a value.
    FuncRef { module: String, name: String },
    Unary { op: UnaryOp, operand: ValueId },
    Binary { op: BinOp, left: ValueId, right: ValueId },
    MakeStruct { fields: Vec<ValueId> },
    MakeVariant { tag: u32, payload: Vec<ValueId> },
    MakeArray { items: Vec<ValueId> },
    ExtractField { base: ValueId, index: u32 },
    ExtractIndex { base: ValueId, index: ValueId },
    TagOf { value: ValueId },
    Payload { value: ValueId, tag: u32, index: u32 },
    ArrayLen { array: ValueId },
    Call { callee: Callee, args: Vec<ValueId> },
    CallIndirect { callee: ValueId, args: Vec<ValueId> },
    /// Suspension point. The instruction's `ty` is the awaited value's type.
    Suspend { value: ValueId },
    Phi { incomings: Vec<(BlockId, ValueId)> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inst {
    pub span: Span,
    /// `None` only for `Alloca` and `Store`. Calls to void functions still
    /// get a destination of type `void`.
    pub dest: Option<ValueId>,
    /// Result type. `Alloca` carries the slot type, `Store` is `void`.
    pub ty: Type,
    pub kind: InstKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Return(Option<ValueId>),
    Br(BlockId),
    CondBr {
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Return(_) => Vec::new(),
            Terminator::Br(b) => vec![*b],
            Terminator::CondBr {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
        }
    }
}

#[derive(Default, Debug)]
pub struct IdGen {
    next_block: u32,
    next_value: u32,
    next_slot: u32,
}

impl IdGen {
    pub fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn fresh_slot(&mut self) -> SlotId {
        let id = SlotId(self.next_slot);
        self.next_slot += 1;
        id
    }
}
