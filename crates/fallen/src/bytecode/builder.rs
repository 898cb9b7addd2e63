//! Builder for emitting instructions during compilation.
//!
//! `UnitBuilder` handles constant-pool deduplication, source-line tracking,
//! and forward jumps with patching: emit a placeholder with [`UnitBuilder::emit_jump`],
//! then backfill the target with [`UnitBuilder::patch_jump`] once it is known.

use std::path::PathBuf;

use crate::{
    bytecode::{
        code::{FuncSpec, Instr, Unit},
        op::Opcode,
    },
    value::Value,
};

/// Label for a forward jump that needs patching.
///
/// Stores the instruction index of the jump. Pass it to `patch_jump()` once
/// the target is known.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JumpLabel(usize);

#[derive(Debug, Default)]
pub(crate) struct UnitBuilder {
    file: String,
    consts: Vec<Value>,
    code: Vec<Instr>,
    lines: Vec<u32>,
    current_line: u32,
    functions: Vec<FuncSpec>,
    exports: Vec<String>,
}

impl UnitBuilder {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_owned(),
            current_line: 1,
            ..Self::default()
        }
    }

    /// Sets the source line recorded for subsequently emitted instructions.
    pub fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    /// Emits a no-operand instruction, returning its index.
    pub fn emit(&mut self, op: Opcode) -> usize {
        self.emit_ab(op, 0, 0)
    }

    /// Emits an instruction with one operand, returning its index.
    pub fn emit_a(&mut self, op: Opcode, a: u32) -> usize {
        self.emit_ab(op, a, 0)
    }

    /// Emits an instruction with two operands, returning its index.
    pub fn emit_ab(&mut self, op: Opcode, a: u32, b: u32) -> usize {
        let ip = self.code.len();
        self.code.push(Instr { op, a, b });
        self.lines.push(self.current_line);
        ip
    }

    /// Emits a forward jump with a placeholder target.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        JumpLabel(self.emit_a(op, u32::MAX))
    }

    /// Patches a forward jump to land on the next emitted instruction.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.next_ip();
        self.patch_a(label.0, target);
    }

    /// Emits a backward jump to a known target.
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        let target = u32::try_from(target).expect("jump target exceeds u32");
        self.emit_a(op, target);
    }

    /// Overwrites the first operand of an already-emitted instruction.
    pub fn patch_a(&mut self, ip: usize, value: usize) {
        self.code[ip].a = u32::try_from(value).expect("jump target exceeds u32");
    }

    /// Overwrites the second operand of an already-emitted instruction.
    pub fn patch_b(&mut self, ip: usize, value: usize) {
        self.code[ip].b = u32::try_from(value).expect("jump target exceeds u32");
    }

    /// The index the next emitted instruction will get.
    #[must_use]
    pub fn next_ip(&self) -> usize {
        self.code.len()
    }

    /// Adds a constant to the pool, deduplicating by kind-strict structural
    /// equality (so `1` and `1.0` stay distinct entries).
    #[must_use]
    pub fn add_const(&mut self, value: Value) -> u32 {
        if let Some(idx) = self.consts.iter().position(|existing| const_eq(existing, &value)) {
            return u32::try_from(idx).expect("constant pool exceeds u32");
        }
        let idx = self.consts.len();
        self.consts.push(value);
        u32::try_from(idx).expect("constant pool exceeds u32")
    }

    /// Adds a name to the pool as a `Str` constant.
    #[must_use]
    pub fn add_name(&mut self, name: &str) -> u32 {
        self.add_const(Value::str(name))
    }

    pub fn declare_function(&mut self, spec: FuncSpec) {
        self.functions.push(spec);
    }

    pub fn set_function_entry(&mut self, index: usize, entry: usize) {
        self.functions[index].entry = entry;
    }

    pub fn declare_export(&mut self, name: &str) {
        if !self.exports.iter().any(|n| n == name) {
            self.exports.push(name.to_owned());
        }
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// Builds the final unit. `dir` is the directory imports resolve against.
    #[must_use]
    pub fn build(self, dir: PathBuf) -> Unit {
        debug_assert!(
            !self.code.iter().any(|i| i.a == u32::MAX
                && matches!(i.op, Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue | Opcode::ForNext)),
            "unpatched jump left in the instruction stream"
        );
        Unit {
            file: self.file,
            dir,
            consts: self.consts,
            code: self.code,
            functions: self.functions,
            exports: self.exports,
            lines: self.lines,
        }
    }
}

/// Kind-strict constant equality used only for pool deduplication.
///
/// Unlike runtime `==`, this never widens Int to Float, and floats compare
/// bitwise so `0.0` and `-0.0` stay distinct.
fn const_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_patching() {
        let mut builder = UnitBuilder::new("t.fallen");
        let jump = builder.emit_jump(Opcode::Jump);
        builder.emit(Opcode::LoadNull);
        builder.emit(Opcode::LoadNull);
        builder.patch_jump(jump);
        builder.emit(Opcode::Halt);

        let unit = builder.build(PathBuf::new());
        assert_eq!(unit.code[0].op, Opcode::Jump);
        assert_eq!(unit.code[0].a, 3);
    }

    #[test]
    fn constants_deduplicate_kind_strictly() {
        let mut builder = UnitBuilder::new("t.fallen");
        let a = builder.add_const(Value::Int(1));
        let b = builder.add_const(Value::Int(1));
        let c = builder.add_const(Value::Float(1.0));
        let d = builder.add_name("x");
        let e = builder.add_name("x");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(d, e);
    }

    #[test]
    fn lines_follow_instructions() {
        let mut builder = UnitBuilder::new("t.fallen");
        builder.set_line(3);
        builder.emit(Opcode::LoadNull);
        builder.set_line(7);
        builder.emit(Opcode::Halt);
        let unit = builder.build(PathBuf::new());
        assert_eq!(unit.lines, vec![3, 7]);
    }
}
