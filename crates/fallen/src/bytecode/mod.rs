//! Bytecode representation, compiler, and virtual machine.
//!
//! - `op` — opcode definitions
//! - `code` — [`Unit`]: constants, instructions, function table, exports
//! - `builder` — `UnitBuilder` for emitting bytecode with jump patching
//! - `compiler` — two-pass AST-to-bytecode compiler
//! - `vm` — the frame-stacked virtual machine

pub use code::{FuncSpec, Instr, ParamSpec, Unit};
pub use compiler::CompileError;
pub use op::Opcode;
pub use vm::Vm;

pub(crate) use compiler::compile;

mod builder;
mod code;
mod compiler;
mod op;
mod vm;
