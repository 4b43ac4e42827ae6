#![forbid(unsafe_code)]

pub mod ir;

mod display;
mod verify;

pub use ir::*;
pub use verify::{verify_function, verify_module, VerifyError};
