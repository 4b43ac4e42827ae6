#![forbid(unsafe_code)]

use std::fmt::{self, Display, Formatter, Write};

use crate::{
    BasicBlock, BinOp, BlockId, Callee, Constant, FunctionIR, Inst, InstKind, Layout, ModuleIR,
    Place, Projection, SlotId, Terminator, Type, UnaryOp, ValueId,
};

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Bool => f.write_str("bool"),
            Type::String => f.write_str("string"),
            Type::Void => f.write_str("void"),
            Type::Named { module, name } => write!(f, "{module}.{name}"),
            Type::Option(inner) => write!(f, "Option<{inner}>"),
            Type::Result(ok, err) => write!(f, "Result<{ok}, {err}>"),
            Type::Array(elem) => write!(f, "[{elem}]"),
            Type::Function { params, ret } => {
                write!(f, "fn({})", comma(params))?;
                if **ret != Type::Void {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl Display for ValueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl Display for SlotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl Display for Place {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slot)?;
        for p in &self.projections {
            match p {
                Projection::Field(i) => write!(f, ".{i}")?,
                Projection::Index(v) => write!(f, "[{v}]")?,
            }
        }
        Ok(())
    }
}

fn comma<T: Display>(items: &[T]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{item}");
    }
    out
}

fn unary_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Not => "not",
    }
}

fn binary_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Rem => "rem",
        BinOp::Concat => "concat",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
    }
}

impl Display for Inst {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(dest) = self.dest {
            write!(f, "{dest}: {} = ", self.ty)?;
        }
        match &self.kind {
            InstKind::Alloca { slot, name } => write!(f, "alloca {slot} {name}: {}", self.ty),
            InstKind::Load { place } => write!(f, "load {place}"),
            InstKind::Store { place, value } => write!(f, "store {place}, {value}"),
            InstKind::Const(c) => write!(f, "const {c}"),
            InstKind::FuncRef { module, name } => write!(f, "funcref {module}.{name}"),
            InstKind::Unary { op, operand } => write!(f, "{} {operand}", unary_name(*op)),
            InstKind::Binary { op, left, right } => {
                write!(f, "{} {left}, {right}", binary_name(*op))
            }
            InstKind::MakeStruct { fields } => write!(f, "struct {{{}}}", comma(fields)),
            InstKind::MakeVariant { tag, payload } => {
                write!(f, "variant #{tag}({})", comma(payload))
            }
            InstKind::MakeArray { items } => write!(f, "array [{}]", comma(items)),
            InstKind::ExtractField { base, index } => write!(f, "field {base}.{index}"),
            InstKind::ExtractIndex { base, index } => write!(f, "index {base}[{index}]"),
            InstKind::TagOf { value } => write!(f, "tag {value}"),
            InstKind::Payload { value, tag, index } => {
                write!(f, "payload {value} #{tag}.{index}")
            }
            InstKind::ArrayLen { array } => write!(f, "len {array}"),
            InstKind::Call { callee, args } => {
                let name = match callee {
                    Callee::Function { module, name } => format!("{module}.{name}"),
                    Callee::Foreign(name) => format!("foreign {name}"),
                };
                write!(f, "call {name}({})", comma(args))
            }
            InstKind::CallIndirect { callee, args } => {
                write!(f, "call {callee}({})", comma(args))
            }
            InstKind::Suspend { value } => write!(f, "suspend {value}"),
            InstKind::Phi { incomings } => {
                f.write_str("phi ")?;
                for (i, (bb, v)) in incomings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{bb}: {v}]")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Terminator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Return(None) => f.write_str("ret"),
            Terminator::Return(Some(v)) => write!(f, "ret {v}"),
            Terminator::Br(bb) => write!(f, "br {bb}"),
            Terminator::CondBr {
                cond,
                then_bb,
                else_bb,
            } => write!(f, "condbr {cond}, {then_bb}, {else_bb}"),
        }
    }
}

impl Display for BasicBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "  {}.{}:", self.id, self.label)?;
        if self.suspend_boundary {
            f.write_str("  ; suspend boundary")?;
        }
        writeln!(f)?;
        for inst in &self.insts {
            writeln!(f, "    {inst}")?;
        }
        writeln!(f, "    {}", self.term)
    }
}

impl Display for FunctionIR {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_async {
            f.write_str("async ")?;
        }
        write!(f, "fn {}(", self.qualified_name())?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}: {}", p.slot, p.name, p.ty)?;
        }
        writeln!(f, ") -> {} {{", self.ret)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

impl Display for ModuleIR {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; unit {}", self.unit)?;
        for (name, layout) in &self.types {
            match layout {
                Layout::Struct { fields } => {
                    let fields: Vec<String> =
                        fields.iter().map(|(n, t)| format!("{n}: {t}")).collect();
                    writeln!(f, "type {name} = struct {{ {} }}", fields.join(", "))?;
                }
                Layout::Enum { variants } => {
                    let variants: Vec<String> = variants
                        .iter()
                        .map(|v| {
                            if v.payload.is_empty() {
                                format!("#{} {}", v.tag, v.name)
                            } else {
                                format!("#{} {}({})", v.tag, v.name, comma(&v.payload))
                            }
                        })
                        .collect();
                    writeln!(f, "type {name} = enum {{ {} }}", variants.join(", "))?;
                }
            }
        }
        for c in &self.constants {
            writeln!(f, "const {}.{}: {} = {}", c.module, c.name, c.value.ty(), c.value)?;
        }
        for (name, sig) in &self.foreign {
            writeln!(f, "foreign {name}({}) -> {}", comma(&sig.params), sig.ret)?;
        }
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
