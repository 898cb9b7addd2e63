//! AST to bytecode compiler.
//!
//! Compilation is two-pass per unit. Pass 1 walks the top-level `func`
//! definitions and registers them in the function table, which hoists them:
//! they are callable from any statement regardless of textual order. Pass 2
//! emits the main body, a trailing `HALT`, then each function body.
//!
//! Short-circuit `and`/`or` and all other control flow lean on the
//! conditionally-consuming jump semantics documented on
//! [`Opcode::JumpIfFalse`]: a taken branch leaves the tested Bool on the
//! stack, so every jump target that can be reached with a stale Bool starts
//! with an explicit `POP`.

use std::{path::PathBuf, str::FromStr as _};

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    ast::{BinaryOp, Block, Expr, ExprKind, Literal, Param, Program, Stmt, StmtKind, UnaryOp},
    builtins::Builtin,
    bytecode::{
        builder::{JumpLabel, UnitBuilder},
        code::{FuncSpec, MARKER_UNCHECKED, ParamSpec, Unit, marker_code},
        op::Opcode,
    },
    value::Value,
};

/// A compile error with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
}

impl CompileError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Compiles a parsed program into a bytecode unit.
///
/// `file` is the source name used in errors and traces; `dir` is the
/// directory imports in the unit resolve against.
pub(crate) fn compile(program: &Program, file: &str, dir: PathBuf) -> Result<Unit, CompileError> {
    let mut compiler = Compiler::new(file);

    // Pass 1: hoist function definitions and collect module-level names.
    for stmt in &program.stmts {
        if let StmtKind::FuncDef { name, params, .. } = &stmt.kind {
            compiler.declare_function(name, params, stmt.line)?;
        }
    }
    collect_defined(&program.stmts, &mut compiler.defined, &mut compiler.has_import);

    // Pass 2: main body, HALT, then function bodies.
    for stmt in &program.stmts {
        if matches!(stmt.kind, StmtKind::FuncDef { .. }) {
            continue;
        }
        compiler.stmt(stmt)?;
    }
    compiler.builder.emit(Opcode::Halt);

    for stmt in &program.stmts {
        if let StmtKind::FuncDef { name, body, .. } = &stmt.kind {
            compiler.function_body(name, body, stmt.line)?;
        }
    }

    Ok(compiler.builder.build(dir))
}

/// Records every name a module-level execution can define: assignments and
/// loop variables outside function bodies, plus hoisted function names.
/// Imports can bind names the compiler cannot see, so their presence is
/// tracked separately.
fn collect_defined(stmts: &[Stmt], defined: &mut AHashSet<String>, has_import: &mut bool) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::VarAssign { name, .. } => {
                defined.insert(name.clone());
            }
            StmtKind::For { var, body, .. } => {
                defined.insert(var.clone());
                collect_defined(body, defined, has_import);
            }
            StmtKind::FuncDef { name, .. } => {
                defined.insert(name.clone());
            }
            StmtKind::Import { .. } => *has_import = true,
            StmtKind::If { branches, else_block } => {
                for (_, block) in branches {
                    collect_defined(block, defined, has_import);
                }
                if let Some(block) = else_block {
                    collect_defined(block, defined, has_import);
                }
            }
            StmtKind::While { body, .. } => collect_defined(body, defined, has_import),
            StmtKind::Match { cases, else_block, .. } => {
                for (_, block) in cases {
                    collect_defined(block, defined, has_import);
                }
                if let Some(block) = else_block {
                    collect_defined(block, defined, has_import);
                }
            }
            _ => {}
        }
    }
}

struct Compiler {
    builder: UnitBuilder,
    /// Number of loops enclosing the statement being compiled (per body).
    loop_depth: usize,
    /// Whether a function body is being compiled.
    in_function: bool,
    /// Nesting depth of `match` statements, for unique temporary names.
    match_depth: usize,
    /// Module-level names, for the undefined-export check.
    defined: AHashSet<String>,
    has_import: bool,
}

impl Compiler {
    fn new(file: &str) -> Self {
        Self {
            builder: UnitBuilder::new(file),
            loop_depth: 0,
            in_function: false,
            match_depth: 0,
            defined: AHashSet::new(),
            has_import: false,
        }
    }

    fn declare_function(&mut self, name: &str, params: &[Param], line: u32) -> Result<(), CompileError> {
        // `amount` is reserved too: calls to it compile to LEN, so a user
        // function by that name could never be reached.
        if Builtin::from_str(name).is_ok() || name == "amount" {
            return Err(CompileError::new(
                line,
                format!("function name '{name}' shadows a builtin"),
            ));
        }
        if self.builder.function_index(name).is_some() {
            return Err(CompileError::new(line, format!("function '{name}' is already defined")));
        }
        let mut seen = AHashSet::new();
        let mut specs: SmallVec<[ParamSpec; 4]> = SmallVec::new();
        for param in params {
            if !seen.insert(param.name.as_str()) {
                return Err(CompileError::new(
                    line,
                    format!("duplicate parameter '{}' in function '{name}'", param.name),
                ));
            }
            specs.push(ParamSpec {
                name: param.name.clone(),
                marker: param.marker,
            });
        }
        self.builder.declare_function(FuncSpec {
            name: name.to_owned(),
            params: specs,
            entry: 0,
        });
        Ok(())
    }

    fn function_body(&mut self, name: &str, body: &Block, line: u32) -> Result<(), CompileError> {
        let index = self
            .builder
            .function_index(name)
            .ok_or_else(|| CompileError::new(line, format!("function '{name}' vanished between passes")))?;
        self.builder.set_function_entry(index, self.builder.next_ip());
        self.in_function = true;
        self.loop_depth = 0;
        for stmt in body {
            self.stmt(stmt)?;
        }
        // Implicit `return null` at the end of every body.
        self.builder.set_line(line);
        self.builder.emit(Opcode::LoadNull);
        self.builder.emit(Opcode::Return);
        self.in_function = false;
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in block {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.builder.set_line(stmt.line);
        match &stmt.kind {
            StmtKind::VarAssign { name, marker, value } => {
                self.expr(value)?;
                self.builder.set_line(stmt.line);
                let name_idx = self.builder.add_name(name);
                self.builder.emit_ab(Opcode::StoreName, name_idx, marker_code(*marker));
            }
            StmtKind::If { branches, else_block } => self.if_stmt(branches, else_block.as_ref())?,
            StmtKind::While { cond, body } => self.while_stmt(cond, body)?,
            StmtKind::For { var, iterable, body } => self.for_stmt(var, iterable, body)?,
            StmtKind::Stop => {
                if self.loop_depth == 0 {
                    return Err(CompileError::new(stmt.line, "'stop' outside of a loop"));
                }
                self.builder.emit(Opcode::Break);
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(CompileError::new(stmt.line, "'continue' outside of a loop"));
                }
                self.builder.emit(Opcode::Continue);
            }
            StmtKind::FuncDef { .. } => {
                return Err(CompileError::new(
                    stmt.line,
                    "function definitions must appear at the top level",
                ));
            }
            StmtKind::Return { value } => {
                if !self.in_function {
                    return Err(CompileError::new(stmt.line, "'return' outside of a function"));
                }
                match value {
                    Some(expr) => self.expr(expr)?,
                    None => {
                        self.builder.emit(Opcode::LoadNull);
                    }
                }
                self.builder.emit(Opcode::Return);
            }
            StmtKind::Match {
                scrutinee,
                cases,
                else_block,
            } => self.match_stmt(scrutinee, cases, else_block.as_ref())?,
            StmtKind::Import { path } => {
                let path_idx = self.builder.add_const(Value::str(path.as_str()));
                self.builder.emit_a(Opcode::Import, path_idx);
            }
            StmtKind::Export { name } => {
                if self.in_function {
                    return Err(CompileError::new(stmt.line, "'export' is only allowed at module level"));
                }
                if !self.defined.contains(name) && !self.has_import {
                    return Err(CompileError::new(stmt.line, format!("export of undefined name '{name}'")));
                }
                self.builder.declare_export(name);
                let name_idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::Export, name_idx);
            }
            StmtKind::SetIndex { name, index, value } => {
                let name_idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::LoadName, name_idx);
                self.expr(index)?;
                self.expr(value)?;
                self.builder.emit(Opcode::IndexSet);
            }
            StmtKind::ListAdd { name, value } => {
                let name_idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::LoadName, name_idx);
                self.expr(value)?;
                self.builder.emit(Opcode::ListAppend);
            }
            StmtKind::ListInsert { name, index, value } => {
                let name_idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::LoadName, name_idx);
                self.expr(index)?;
                self.expr(value)?;
                self.builder.emit(Opcode::ListInsert);
            }
            StmtKind::Remove { name, index } => {
                let name_idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::LoadName, name_idx);
                self.expr(index)?;
                self.builder.emit(Opcode::RemoveAt);
            }
            StmtKind::TraceToggle { on } => {
                self.builder.emit(if *on { Opcode::TraceOn } else { Opcode::TraceOff });
            }
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                self.builder.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    fn if_stmt(&mut self, branches: &[(Expr, Block)], else_block: Option<&Block>) -> Result<(), CompileError> {
        let mut end_jumps = Vec::new();
        let mut false_jump: Option<JumpLabel> = None;
        for (cond, block) in branches {
            if let Some(jump) = false_jump.take() {
                self.builder.patch_jump(jump);
                self.builder.emit(Opcode::Pop);
            }
            self.expr(cond)?;
            false_jump = Some(self.builder.emit_jump(Opcode::JumpIfFalse));
            self.block(block)?;
            end_jumps.push(self.builder.emit_jump(Opcode::Jump));
        }
        if let Some(jump) = false_jump {
            self.builder.patch_jump(jump);
            self.builder.emit(Opcode::Pop);
        }
        if let Some(block) = else_block {
            self.block(block)?;
        }
        for jump in end_jumps {
            self.builder.patch_jump(jump);
        }
        Ok(())
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        let push_ip = self.builder.emit_ab(Opcode::LoopPush, u32::MAX, u32::MAX);
        let top = self.builder.next_ip();
        self.builder.patch_b(push_ip, top);
        self.expr(cond)?;
        let exit_jump = self.builder.emit_jump(Opcode::JumpIfFalse);
        self.loop_depth += 1;
        self.block(body)?;
        self.loop_depth -= 1;
        self.builder.emit_jump_to(Opcode::Jump, top);
        // Normal exit: the stale condition Bool is still on the stack.
        self.builder.patch_jump(exit_jump);
        self.builder.emit(Opcode::Pop);
        self.builder.emit(Opcode::LoopPop);
        // `stop` lands here with the record already popped and a clean stack.
        let after = self.builder.next_ip();
        self.builder.patch_a(push_ip, after);
        Ok(())
    }

    fn for_stmt(&mut self, var: &str, iterable: &Expr, body: &Block) -> Result<(), CompileError> {
        self.expr(iterable)?;
        self.builder.emit(Opcode::ForStart);
        let push_ip = self.builder.emit_ab(Opcode::LoopPush, u32::MAX, u32::MAX);
        let top = self.builder.next_ip();
        self.builder.patch_b(push_ip, top);
        let var_idx = self.builder.add_name(var);
        let next_ip = self.builder.emit_ab(Opcode::ForNext, u32::MAX, var_idx);
        self.loop_depth += 1;
        self.block(body)?;
        self.loop_depth -= 1;
        self.builder.emit_jump_to(Opcode::Jump, top);
        // Exhaustion: FOR_NEXT has already popped the cursor.
        let exhausted = self.builder.next_ip();
        self.builder.patch_a(next_ip, exhausted);
        self.builder.emit(Opcode::LoopPop);
        let skip = self.builder.emit_jump(Opcode::Jump);
        // `stop`: the record is popped by BREAK but the cursor remains.
        let break_target = self.builder.next_ip();
        self.builder.patch_a(push_ip, break_target);
        self.builder.emit(Opcode::Pop);
        self.builder.patch_jump(skip);
        Ok(())
    }

    fn match_stmt(
        &mut self,
        scrutinee: &Expr,
        cases: &[(Literal, Block)],
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        // Evaluate the scrutinee once into a hidden temporary; `@` cannot
        // appear in a source identifier, so user code can never collide.
        self.expr(scrutinee)?;
        let temp_idx = self.builder.add_name(&format!("@match{}", self.match_depth));
        self.match_depth += 1;
        self.builder.emit_ab(Opcode::StoreName, temp_idx, MARKER_UNCHECKED);

        let mut end_jumps = Vec::new();
        let mut next_jump: Option<JumpLabel> = None;
        for (head, block) in cases {
            if let Some(jump) = next_jump.take() {
                self.builder.patch_jump(jump);
                self.builder.emit(Opcode::Pop);
            }
            self.builder.emit_a(Opcode::LoadName, temp_idx);
            let head_idx = self.builder.add_const(literal_value(head));
            self.builder.emit_a(Opcode::LoadConst, head_idx);
            self.builder.emit(Opcode::Eq);
            next_jump = Some(self.builder.emit_jump(Opcode::JumpIfFalse));
            self.block(block)?;
            end_jumps.push(self.builder.emit_jump(Opcode::Jump));
        }
        if let Some(jump) = next_jump {
            self.builder.patch_jump(jump);
            self.builder.emit(Opcode::Pop);
        }
        if let Some(block) = else_block {
            self.block(block)?;
        }
        for jump in end_jumps {
            self.builder.patch_jump(jump);
        }
        self.match_depth -= 1;
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.builder.set_line(expr.line);
        match &expr.kind {
            ExprKind::Literal(lit) => {
                let idx = self.builder.add_const(literal_value(lit));
                self.builder.emit_a(Opcode::LoadConst, idx);
            }
            ExprKind::Var(name) => {
                let idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::LoadName, idx);
            }
            ExprKind::Binary { op: BinaryOp::And, lhs, rhs } => {
                self.expr(lhs)?;
                let jump = self.builder.emit_jump(Opcode::JumpIfFalse);
                self.expr(rhs)?;
                self.builder.patch_jump(jump);
            }
            ExprKind::Binary { op: BinaryOp::Or, lhs, rhs } => {
                self.expr(lhs)?;
                let jump = self.builder.emit_jump(Opcode::JumpIfTrue);
                self.expr(rhs)?;
                self.builder.patch_jump(jump);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.builder.set_line(expr.line);
                self.builder.emit(binary_opcode(*op));
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                self.builder.set_line(expr.line);
                self.builder.emit(match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                });
            }
            ExprKind::Call { name, args } => {
                // `amount` is lowered entirely here: one argument becomes
                // the LEN opcode, anything else never reaches the runtime.
                if name == "amount" {
                    if args.len() != 1 {
                        return Err(CompileError::new(
                            expr.line,
                            format!("'amount' takes 1 argument but {} were given", args.len()),
                        ));
                    }
                    self.expr(&args[0])?;
                    self.builder.set_line(expr.line);
                    self.builder.emit(Opcode::Len);
                    return Ok(());
                }
                for arg in args {
                    self.expr(arg)?;
                }
                self.builder.set_line(expr.line);
                let name_idx = self.builder.add_name(name);
                let argc = u32::try_from(args.len())
                    .map_err(|_| CompileError::new(expr.line, "too many call arguments"))?;
                self.builder.emit_ab(Opcode::Call, name_idx, argc);
            }
            ExprKind::Index { name, index } => {
                let name_idx = self.builder.add_name(name);
                self.builder.emit_a(Opcode::LoadName, name_idx);
                self.expr(index)?;
                self.builder.set_line(expr.line);
                self.builder.emit(Opcode::IndexGet);
            }
            ExprKind::ListLit(elems) => {
                for elem in elems {
                    self.expr(elem)?;
                }
                self.builder.set_line(expr.line);
                let count = u32::try_from(elems.len())
                    .map_err(|_| CompileError::new(expr.line, "list literal too large"))?;
                self.builder.emit_a(Opcode::BuildList, count);
            }
            ExprKind::DictLit(pairs) => {
                for (key, value) in pairs {
                    self.expr(key)?;
                    self.expr(value)?;
                }
                self.builder.set_line(expr.line);
                let count = u32::try_from(pairs.len())
                    .map_err(|_| CompileError::new(expr.line, "dict literal too large"))?;
                self.builder.emit_a(Opcode::BuildDict, count);
            }
        }
        Ok(())
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(v) => Value::Int(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::Str(v) => Value::str(v.as_str()),
        Literal::Bool(v) => Value::Bool(*v),
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops are lowered to jumps"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parse::parse;

    fn compile_str(source: &str) -> Result<Unit, CompileError> {
        compile(&parse(source).unwrap(), "t.fallen", PathBuf::new())
    }

    fn ops(unit: &Unit) -> Vec<Opcode> {
        unit.code.iter().map(|i| i.op).collect()
    }

    #[test]
    fn functions_are_hoisted_after_halt() {
        let unit = compile_str("f()\nfunc f() { return 1 }").unwrap();
        let halt_at = ops(&unit).iter().position(|&op| op == Opcode::Halt).unwrap();
        let (_, spec) = unit.function_named("f").unwrap();
        assert!(spec.entry > halt_at, "function body must follow the main HALT");
        // The call in the main body resolves even though `f` is defined later.
        assert_eq!(unit.code[0].op, Opcode::Call);
    }

    #[test]
    fn stop_outside_loop_is_rejected() {
        let err = compile_str("stop").unwrap_err();
        assert_eq!(err.message, "'stop' outside of a loop");
        let err = compile_str("func f() { continue }").unwrap_err();
        assert_eq!(err.message, "'continue' outside of a loop");
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let err = compile_str("return 1").unwrap_err();
        assert_eq!(err.message, "'return' outside of a function");
    }

    #[test]
    fn duplicate_function_is_rejected() {
        let err = compile_str("func f() { }\nfunc f() { }").unwrap_err();
        assert_eq!(err.message, "function 'f' is already defined");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn export_of_undefined_name_is_rejected() {
        let err = compile_str("export missing").unwrap_err();
        assert_eq!(err.message, "export of undefined name 'missing'");
        assert!(compile_str("x =i 1\nexport x").is_ok());
        assert!(compile_str("func f() { }\nexport f").is_ok());
    }

    #[test]
    fn builtin_shadowing_is_rejected() {
        let err = compile_str("func write(x =i) { }").unwrap_err();
        assert_eq!(err.message, "function name 'write' shadows a builtin");
        let err = compile_str("func amount(x =l) { }").unwrap_err();
        assert_eq!(err.message, "function name 'amount' shadows a builtin");
    }

    #[test]
    fn and_lowers_to_conditional_jump_over_rhs() {
        let unit = compile_str("x =b true and false").unwrap();
        assert_eq!(
            ops(&unit),
            vec![
                Opcode::LoadConst,
                Opcode::JumpIfFalse,
                Opcode::LoadConst,
                Opcode::StoreName,
                Opcode::Halt,
            ]
        );
        // The jump skips the rhs load and lands on the store.
        assert_eq!(unit.code[1].a, 3);
    }

    #[test]
    fn amount_compiles_to_len() {
        let unit = compile_str("n =i amount([1, 2])").unwrap();
        assert!(ops(&unit).contains(&Opcode::Len));
        assert!(!ops(&unit).contains(&Opcode::Call));
    }

    #[test]
    fn amount_arity_is_checked_at_compile_time() {
        let err = compile_str("n =i amount([1], [2])").unwrap_err();
        assert_eq!(err.message, "'amount' takes 1 argument but 2 were given");
        let err = compile_str("n =i amount()").unwrap_err();
        assert_eq!(err.message, "'amount' takes 1 argument but 0 were given");
    }

    #[test]
    fn while_loop_shape() {
        let unit = compile_str("while true { stop }").unwrap();
        assert_eq!(
            ops(&unit),
            vec![
                Opcode::LoopPush,
                Opcode::LoadConst,
                Opcode::JumpIfFalse,
                Opcode::Break,
                Opcode::Jump,
                Opcode::Pop,
                Opcode::LoopPop,
                Opcode::Halt,
            ]
        );
        let push = unit.code[0];
        assert_eq!(push.b as usize, 1, "continue target is the condition");
        assert_eq!(push.a as usize, 7, "break target is past the normal-exit cleanup");
    }

    #[test]
    fn match_uses_a_hidden_temporary() {
        let unit = compile_str("match 2 { 1 { } else { } }").unwrap();
        assert!(unit.consts.iter().any(|c| matches!(c, Value::Str(s) if &**s == "@match0")));
    }

    #[test]
    fn nested_function_definition_is_rejected() {
        let err = compile_str("if true { func f() { } }").unwrap_err();
        assert_eq!(err.message, "function definitions must appear at the top level");
    }
}
