//! Compiled bytecode units.
//!
//! A [`Unit`] is the compiled form of one source file: constant pool,
//! instruction stream, function table and export table, plus the per-
//! instruction source lines used for stack traces.

use std::{fmt::Write as _, path::PathBuf};

use smallvec::SmallVec;

use crate::{ast::TypeMarker, bytecode::op::Opcode, value::Value};

/// `STORE_NAME` marker operand meaning "store without a kind check".
///
/// Only the compiler emits it, for hidden `match` temporaries; it is not
/// reachable from source markers.
pub(crate) const MARKER_UNCHECKED: u32 = 6;

/// Encodes a type marker into a `STORE_NAME` operand.
pub(crate) fn marker_code(marker: TypeMarker) -> u32 {
    match marker {
        TypeMarker::Str => 0,
        TypeMarker::Int => 1,
        TypeMarker::Float => 2,
        TypeMarker::Bool => 3,
        TypeMarker::List => 4,
        TypeMarker::Dict => 5,
    }
}

/// Decodes a `STORE_NAME` operand back into a marker.
///
/// Returns `None` for [`MARKER_UNCHECKED`].
pub(crate) fn marker_from_code(code: u32) -> Option<TypeMarker> {
    match code {
        0 => Some(TypeMarker::Str),
        1 => Some(TypeMarker::Int),
        2 => Some(TypeMarker::Float),
        3 => Some(TypeMarker::Bool),
        4 => Some(TypeMarker::List),
        5 => Some(TypeMarker::Dict),
        _ => None,
    }
}

/// One instruction: an opcode and up to two integer operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instr {
    pub op: Opcode,
    pub a: u32,
    pub b: u32,
}

/// A parameter descriptor in the function table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub marker: TypeMarker,
}

/// A function table entry: name, parameter descriptors and entry offset.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSpec {
    pub name: String,
    pub params: SmallVec<[ParamSpec; 4]>,
    /// Instruction index of the function body (after the main body's HALT).
    pub entry: usize,
}

/// The compiled form of one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Source file name for error reporting.
    pub file: String,
    /// Directory imports in this unit resolve against.
    pub dir: PathBuf,
    /// Constant pool, deduplicated by kind-strict structural equality.
    pub consts: Vec<Value>,
    /// The instruction stream: main body, `HALT`, then function bodies.
    pub code: Vec<Instr>,
    /// Function table, in definition order.
    pub functions: Vec<FuncSpec>,
    /// Names that appear in `export` statements.
    pub exports: Vec<String>,
    /// 1-based source line per instruction (parallel to `code`).
    pub lines: Vec<u32>,
}

impl Unit {
    /// Looks up a function table entry by name.
    #[must_use]
    pub fn function_named(&self, name: &str) -> Option<(usize, &FuncSpec)> {
        self.functions.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// The string payload of a pool constant that is known to be a name.
    ///
    /// # Panics
    /// Panics if the index does not hold a `Str` constant, which indicates a
    /// compiler bug.
    #[must_use]
    pub(crate) fn name_at(&self, idx: u32) -> &str {
        match &self.consts[idx as usize] {
            Value::Str(s) => s,
            other => panic!("constant {idx} is not a name: {other:?}"),
        }
    }

    /// Renders the constant pool and instruction listing for `build`.
    #[must_use]
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "unit {}", self.file);
        let _ = writeln!(out, "constants:");
        for (idx, value) in self.consts.iter().enumerate() {
            let _ = writeln!(out, "  [{idx}] {} {}", value.type_name(), value.repr());
        }
        if !self.functions.is_empty() {
            let _ = writeln!(out, "functions:");
            for func in &self.functions {
                let params = func
                    .params
                    .iter()
                    .map(|p| format!("{} {}", p.name, p.marker.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "  {}({params}) entry={:04x}", func.name, func.entry);
            }
        }
        if !self.exports.is_empty() {
            let _ = writeln!(out, "exports: {}", self.exports.join(", "));
        }
        let _ = writeln!(out, "code:");
        for (ip, instr) in self.code.iter().enumerate() {
            let name: &'static str = instr.op.into();
            match instr.op.operand_count() {
                1 => {
                    let _ = writeln!(out, "  {ip:04x} {name:<14} {}", instr.a);
                }
                2 => {
                    let _ = writeln!(out, "  {ip:04x} {name:<14} {} {}", instr.a, instr.b);
                }
                _ => {
                    let _ = writeln!(out, "  {ip:04x} {name}");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembly_lists_pool_and_code() {
        let unit = Unit {
            file: "t.fallen".to_owned(),
            dir: PathBuf::new(),
            consts: vec![Value::Int(14), Value::str("write")],
            code: vec![
                Instr {
                    op: Opcode::LoadConst,
                    a: 0,
                    b: 0,
                },
                Instr {
                    op: Opcode::Call,
                    a: 1,
                    b: 1,
                },
                Instr {
                    op: Opcode::Halt,
                    a: 0,
                    b: 0,
                },
            ],
            functions: vec![],
            exports: vec![],
            lines: vec![1, 1, 1],
        };
        let listing = unit.disassemble();
        assert!(listing.contains("[0] int 14"));
        assert!(listing.contains(&format!("  0000 {:<14} 0\n", "LOAD_CONST")));
        assert!(listing.contains(&format!("  0001 {:<14} 1 1\n", "CALL")));
        assert!(listing.contains("  0002 HALT\n"));
    }
}
