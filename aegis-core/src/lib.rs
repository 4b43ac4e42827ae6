#![forbid(unsafe_code)]

mod config;
mod consteval;
mod error;
mod foreign;
mod index;
mod lower;
mod ownership;
mod pipeline;
mod scope;
mod sema;
mod types;

pub use config::CompilerConfig;
pub use error::SemanticError;
pub use foreign::{ForeignDeclError, ForeignFn, ForeignTable};
pub use index::{ConstInfo, EnumInfo, FnSig, GlobalIndex, Member, ModuleSymbols, StructInfo, VariantInfo};
pub use lower::lower_unit;
pub use ownership::{Conflict, OwnershipState};
pub use pipeline::{AbortHandle, CompileOutput, Compiler, SourceUnit, UnitResult, UnitStatus};
pub use scope::{BindingId, Case};
pub use sema::{check_unit, CheckedUnit, Discrimination, Resolution};
pub use types::{DeclRef, Type};
