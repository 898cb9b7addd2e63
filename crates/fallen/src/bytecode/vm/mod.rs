//! Stack-based virtual machine.
//!
//! The VM runs a stack of [`Frame`]s. The top frame executes until it issues
//! `RETURN` (popping itself and pushing its result onto the caller) or its
//! unit `HALT`s. Imports push a module frame onto the same stack and run it
//! inline to `HALT`, so stack traces cross import boundaries naturally and a
//! failure leaving a module frame is wrapped in [`Error::Import`].
//!
//! The conditional jumps are conditionally-consuming: `JUMP_IF_FALSE` /
//! `JUMP_IF_TRUE` peek the Bool on top of the stack and, when the jump is
//! taken, leave it there (that value is the result of a short-circuit `and` /
//! `or`). On fallthrough the Bool is popped. The compiler plants an explicit
//! `POP` at every target reachable with a stale Bool.

mod binary;
mod collections;

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    str::FromStr as _,
};

use ahash::AHashMap;

use crate::{
    builtins::Builtin,
    bytecode::{
        code::{Unit, marker_from_code},
        op::Opcode,
    },
    error::{Error, RuntimeError, StackFrame},
    io::Console,
    modules::{ModuleRegistry, ModuleState, compute_exports, partial_exports},
    value::{Env, FuncRef, Value},
};

/// A loop-exit record: where `stop` and `continue` jump for the innermost
/// active loop.
#[derive(Debug, Clone, Copy)]
struct LoopRecord {
    break_ip: usize,
    continue_ip: usize,
}

/// What kind of body a frame is executing.
#[derive(Debug)]
enum FrameKind {
    /// The outermost body: a script main body or a REPL input. `path` is the
    /// canonical script path when the script is registered as a module
    /// (imports of the running script then resolve without re-execution).
    Top { path: Option<PathBuf> },
    /// A function call.
    Function { name: String },
    /// A module body pushed by `IMPORT`. `import_path` is the path as
    /// written in source, used for the import-error prefix.
    Module { path: PathBuf, import_path: String },
}

/// One in-progress call: unit, instruction pointer, operand stack, local
/// environment, loop-exit stack, and the source-line register.
#[derive(Debug)]
struct Frame {
    unit: Rc<Unit>,
    ip: usize,
    stack: Vec<Value>,
    env: Env,
    loops: Vec<LoopRecord>,
    line: u32,
    /// Names passed to `EXPORT` while this body ran.
    exported: Vec<String>,
    kind: FrameKind,
}

impl Frame {
    /// Builds a top-level body frame (script main, module body, REPL input).
    ///
    /// Every hoisted function of the unit is bound into the environment as a
    /// `Func` value, which makes functions exportable and importable.
    fn top_level(unit: Rc<Unit>, mut env: Env, kind: FrameKind) -> Self {
        for (index, func) in unit.functions.iter().enumerate() {
            env.insert(
                func.name.clone(),
                Value::Func(FuncRef {
                    unit: unit.clone(),
                    index,
                }),
            );
        }
        Self {
            line: unit.lines.first().copied().unwrap_or(1),
            unit,
            ip: 0,
            stack: Vec::new(),
            env,
            loops: Vec::new(),
            exported: Vec::new(),
            kind,
        }
    }

    fn call(func: &FuncRef, env: Env, name: String) -> Self {
        let entry = func.unit.functions[func.index].entry;
        Self {
            line: func.unit.lines.get(entry).copied().unwrap_or(1),
            unit: func.unit.clone(),
            ip: entry,
            stack: Vec::new(),
            env,
            loops: Vec::new(),
            exported: Vec::new(),
            kind: FrameKind::Function { name },
        }
    }

    /// The name this frame contributes to stack traces.
    fn trace_name(&self) -> &str {
        match &self.kind {
            FrameKind::Function { name } => name,
            FrameKind::Top { .. } | FrameKind::Module { .. } => "<main>",
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }
}

/// Internal error channel of the dispatch loop.
enum VmError {
    /// A runtime error that still needs ip stamping and a stack trace.
    Runtime(RuntimeError),
    /// A fully formed error (static import failures); only import wrapping
    /// is still applied.
    Fatal(Error),
}

impl From<RuntimeError> for VmError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

/// Outcome of one dispatched instruction.
enum Step {
    Continue,
    /// The outermost frame halted; its environment is the result.
    Done(Env),
}

/// Functions a unit can call beyond its own function table: imported `Func`
/// bindings (and, for REPL inputs, functions inherited from the session).
///
/// The `unit` handle keeps the keyed unit alive so the map key (its address)
/// can never be reused by a different unit.
#[derive(Debug)]
struct UnitFuncs {
    unit: Rc<Unit>,
    funcs: AHashMap<String, FuncRef>,
}

/// The virtual machine: frame stack, module registry and trace flag.
///
/// One `Vm` is one "process": the registry and the trace flag live exactly
/// as long as the `Vm`, and the REPL keeps a single `Vm` across inputs.
#[derive(Debug)]
pub struct Vm {
    registry: ModuleRegistry,
    trace: bool,
    program_dir: PathBuf,
    /// Per-unit callable imports, keyed by the unit's address.
    unit_funcs: AHashMap<usize, UnitFuncs>,
}

impl Vm {
    /// Creates a VM whose file builtins resolve paths against `program_dir`.
    pub fn new(program_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: ModuleRegistry::new(),
            trace: false,
            program_dir: program_dir.into(),
            unit_funcs: AHashMap::new(),
        }
    }

    /// Records every `Func` value in `bindings` as callable from code
    /// compiled into `unit`.
    ///
    /// This implements the "module's loaded unit" leg of call resolution:
    /// function bodies have frame-local environments, so functions a unit
    /// gained by import (or a REPL input inherited from the session) are
    /// looked up here rather than in the caller's environment.
    fn register_unit_funcs<'a>(&mut self, unit: &Rc<Unit>, bindings: impl Iterator<Item = (&'a String, &'a Value)>) {
        let entry = self
            .unit_funcs
            .entry(Rc::as_ptr(unit) as usize)
            .or_insert_with(|| UnitFuncs {
                unit: unit.clone(),
                funcs: AHashMap::new(),
            });
        for (name, value) in bindings {
            if let Value::Func(func) = value {
                entry.funcs.insert(name.clone(), func.clone());
            }
        }
    }

    /// Looks up an imported (or session-inherited) function for `unit`.
    fn unit_func(&self, unit: &Rc<Unit>, name: &str) -> Option<FuncRef> {
        self.unit_funcs
            .get(&(Rc::as_ptr(unit) as usize))
            .and_then(|entry| entry.funcs.get(name))
            .cloned()
    }

    /// The directory `save`/`change`/`read` resolve relative paths against.
    #[must_use]
    pub fn program_dir(&self) -> &Path {
        &self.program_dir
    }

    /// Runs a unit's main body to `HALT` and returns the final environment.
    ///
    /// `globals` seeds the top-level environment (the REPL passes the
    /// accumulated session environment).
    pub fn run_unit(&mut self, unit: &Rc<Unit>, globals: Env, console: &mut impl Console) -> Result<Env, Error> {
        self.run_main(unit, globals, None, console)
    }

    /// Like [`Vm::run_unit`], but registers the script under its canonical
    /// path first so that import cycles reaching back into the running
    /// script resolve instead of re-executing it.
    pub fn run_main(
        &mut self,
        unit: &Rc<Unit>,
        globals: Env,
        script_path: Option<PathBuf>,
        console: &mut impl Console,
    ) -> Result<Env, Error> {
        if let Some(path) = &script_path {
            self.registry.begin(path.clone());
        }
        self.register_unit_funcs(unit, globals.iter());
        let mut frames = vec![Frame::top_level(
            unit.clone(),
            globals,
            FrameKind::Top { path: script_path },
        )];
        loop {
            let ip = frames.last().map_or(0, |frame| frame.ip);
            match self.step(&mut frames, console) {
                Ok(Step::Continue) => {}
                Ok(Step::Done(env)) => return Ok(env),
                Err(VmError::Runtime(mut err)) => {
                    err.ip = ip;
                    return Err(unwind(&frames, err));
                }
                Err(VmError::Fatal(err)) => return Err(wrap_imports(&frames, err)),
            }
        }
    }

    /// Dispatches a single instruction of the top frame.
    fn step(&mut self, frames: &mut Vec<Frame>, console: &mut impl Console) -> Result<Step, VmError> {
        let frame = frames.last_mut().expect("frame stack empty");
        let ip = frame.ip;
        let Some(&instr) = frame.unit.code.get(ip) else {
            return Err(RuntimeError::msg("instruction pointer ran off the unit").into());
        };
        frame.line = frame.unit.lines[ip];
        if self.trace {
            let name: &'static str = instr.op.into();
            console.diag(&format!(
                "TRACE ip={ip:04x} ({name}, {}) stack={}",
                instr.a,
                frame.stack.len()
            ));
        }
        frame.ip = ip + 1;

        match instr.op {
            Opcode::LoadConst => {
                let value = frame.unit.consts[instr.a as usize].clone();
                frame.stack.push(value);
            }
            Opcode::LoadNull => frame.stack.push(Value::Null),
            Opcode::LoadName => {
                let name = frame.unit.name_at(instr.a);
                let Some(value) = frame.env.get(name).cloned() else {
                    return Err(RuntimeError::msg(format!("Undefined variable '{name}'")).into());
                };
                frame.stack.push(value);
            }
            Opcode::StoreName => {
                let value = frame.pop();
                let name = frame.unit.name_at(instr.a);
                if let Some(marker) = marker_from_code(instr.b)
                    && value.kind() != marker.kind()
                {
                    return Err(RuntimeError::msg(format!(
                        "Type error: variable '{name}' has marker {} but value is {}",
                        marker.as_str(),
                        value.type_name()
                    ))
                    .into());
                }
                frame.env.insert(name.to_owned(), value);
            }
            Opcode::Pop => {
                frame.pop();
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Le
            | Opcode::Gt
            | Opcode::Ge => {
                let rhs = frame.pop();
                let lhs = frame.pop();
                frame.stack.push(binary::binary(instr.op, &lhs, &rhs)?);
            }
            Opcode::Neg => {
                let operand = frame.pop();
                frame.stack.push(binary::negate(&operand)?);
            }
            Opcode::Not => {
                let operand = frame.pop();
                frame.stack.push(binary::logical_not(&operand)?);
            }
            Opcode::Jump => frame.ip = instr.a as usize,
            Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                let cond = frame.stack.last().expect("conditional jump on empty stack");
                let Some(cond) = cond.as_bool() else {
                    return Err(
                        RuntimeError::msg(format!("Condition must be a bool, got {}", cond.type_name())).into(),
                    );
                };
                let jump_on = instr.op == Opcode::JumpIfTrue;
                if cond == jump_on {
                    // Taken: the tested value stays as the expression result.
                    frame.ip = instr.a as usize;
                } else {
                    frame.pop();
                }
            }
            Opcode::Halt => return self.op_halt(frames),
            Opcode::BuildList => {
                let count = instr.a as usize;
                let items = frame.stack.split_off(frame.stack.len() - count);
                frame.stack.push(Value::list(items));
            }
            Opcode::BuildDict => {
                let count = instr.a as usize;
                let flat = frame.stack.split_off(frame.stack.len() - 2 * count);
                let mut pairs = indexmap::IndexMap::with_capacity(count);
                let mut flat = flat.into_iter();
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    let Value::Str(key) = key else {
                        return Err(
                            RuntimeError::msg(format!("Dict key must be a str, got {}", key.type_name())).into(),
                        );
                    };
                    pairs.insert(key.to_string(), value);
                }
                frame.stack.push(Value::dict(pairs));
            }
            Opcode::IndexGet => {
                let index = frame.pop();
                let container = frame.pop();
                frame.stack.push(collections::index_get(&container, &index)?);
            }
            Opcode::IndexSet => {
                let value = frame.pop();
                let index = frame.pop();
                let container = frame.pop();
                collections::index_set(&container, &index, value)?;
            }
            Opcode::ListAppend => {
                let value = frame.pop();
                let container = frame.pop();
                collections::list_append(&container, value)?;
            }
            Opcode::ListInsert => {
                let value = frame.pop();
                let index = frame.pop();
                let container = frame.pop();
                collections::list_insert(&container, &index, value)?;
            }
            Opcode::RemoveAt => {
                let index = frame.pop();
                let container = frame.pop();
                collections::remove_at(&container, &index)?;
            }
            Opcode::Len => {
                let value = frame.pop();
                frame.stack.push(collections::length_of(&value)?);
            }
            Opcode::Call => return self.op_call(frames, instr.a, instr.b as usize, console).map(|()| Step::Continue),
            Opcode::Return => {
                let result = frame.pop();
                frames.pop();
                let caller = frames.last_mut().expect("RETURN from the outermost frame");
                caller.stack.push(result);
            }
            Opcode::LoopPush => frame.loops.push(LoopRecord {
                break_ip: instr.a as usize,
                continue_ip: instr.b as usize,
            }),
            Opcode::LoopPop => {
                frame.loops.pop().expect("LOOP_POP without an active loop");
            }
            Opcode::Break => {
                let record = frame.loops.pop().expect("BREAK without an active loop");
                frame.ip = record.break_ip;
            }
            Opcode::Continue => {
                let record = frame.loops.last().expect("CONTINUE without an active loop");
                frame.ip = record.continue_ip;
            }
            Opcode::ForStart => {
                let iterable = frame.pop();
                let cursor = collections::iteration_cursor(&iterable)?;
                frame.stack.push(Value::Cursor(Box::new(cursor)));
            }
            Opcode::ForNext => {
                let var_name = frame.unit.name_at(instr.b);
                let advanced = match frame.stack.last_mut() {
                    Some(Value::Cursor(cursor)) => {
                        if cursor.pos < cursor.items.len() {
                            let item = cursor.items[cursor.pos].clone();
                            cursor.pos += 1;
                            Some(item)
                        } else {
                            None
                        }
                    }
                    _ => return Err(RuntimeError::msg("FOR_NEXT without a cursor").into()),
                };
                match advanced {
                    Some(item) => {
                        frame.env.insert(var_name.to_owned(), item);
                    }
                    None => {
                        frame.pop();
                        frame.ip = instr.a as usize;
                    }
                }
            }
            Opcode::Import => self.op_import(frames, instr.a)?,
            Opcode::Export => {
                let name = frame.unit.name_at(instr.a).to_owned();
                frame.exported.push(name);
            }
            Opcode::TraceOn => self.trace = true,
            Opcode::TraceOff => self.trace = false,
        }
        Ok(Step::Continue)
    }

    /// Resolves and executes a `CALL`: builtins first, then the current
    /// unit's function table, then a `Func` value in the local environment
    /// (how imported functions are reached).
    fn op_call(
        &mut self,
        frames: &mut Vec<Frame>,
        name_idx: u32,
        argc: usize,
        console: &mut impl Console,
    ) -> Result<(), VmError> {
        let frame = frames.last_mut().expect("frame stack empty");
        let name = frame.unit.name_at(name_idx).to_owned();

        if let Ok(builtin) = Builtin::from_str(&name) {
            let args = frame.stack.split_off(frame.stack.len() - argc);
            let result = builtin.call(args, &self.program_dir, console)?;
            frame.stack.push(result);
            return Ok(());
        }

        let func = if let Some((index, _)) = frame.unit.function_named(&name) {
            FuncRef {
                unit: frame.unit.clone(),
                index,
            }
        } else if let Some(Value::Func(func)) = frame.env.get(&name) {
            func.clone()
        } else if let Some(func) = self.unit_func(&frame.unit, &name) {
            func
        } else {
            return Err(RuntimeError::msg(format!("Undefined function '{name}'")).into());
        };

        let spec = &func.unit.functions[func.index];
        if argc != spec.params.len() {
            return Err(RuntimeError::msg(format!(
                "Function '{name}' takes {} arguments but {argc} were given",
                spec.params.len()
            ))
            .into());
        }
        let args = frame.stack.split_off(frame.stack.len() - argc);
        let mut env = Env::with_capacity(args.len());
        for (param, arg) in spec.params.iter().zip(args) {
            if arg.kind() != param.marker.kind() {
                return Err(RuntimeError::msg(format!(
                    "Type error: parameter '{}' of '{name}' has marker {} but argument is {}",
                    param.name,
                    param.marker.as_str(),
                    arg.type_name()
                ))
                .into());
            }
            env.insert(param.name.clone(), arg);
        }
        let new_frame = Frame::call(&func, env, name);
        frames.push(new_frame);
        Ok(())
    }

    /// `HALT` ends either the whole run (top frame) or a module body.
    fn op_halt(&mut self, frames: &mut Vec<Frame>) -> Result<Step, VmError> {
        // Finalize exports while the frame is still on the stack so a
        // failure unwinds with it.
        let frame = frames.last().expect("frame stack empty");
        match &frame.kind {
            FrameKind::Top { path } => {
                let exports = if path.is_some() {
                    Some(compute_exports(&frame.exported, &frame.env)?)
                } else {
                    None
                };
                let frame = frames.pop().expect("frame stack empty");
                if let (FrameKind::Top { path: Some(path) }, Some(exports)) = (&frame.kind, exports) {
                    self.registry.finish(path, exports);
                }
                Ok(Step::Done(frame.env))
            }
            FrameKind::Module { .. } => {
                let exports = compute_exports(&frame.exported, &frame.env)?;
                let frame = frames.pop().expect("frame stack empty");
                let FrameKind::Module { path, .. } = frame.kind else {
                    unreachable!()
                };
                self.registry.finish(&path, exports.clone());
                debug_assert!(!frames.is_empty(), "module frame without an importer");
                self.bind_exports(frames, exports);
                Ok(Step::Continue)
            }
            FrameKind::Function { .. } => Err(RuntimeError::msg("HALT inside a function frame").into()),
        }
    }

    /// Merges a module's exports into the importing (top) frame's
    /// environment and records exported functions as callable from the
    /// importer's unit.
    fn bind_exports(&mut self, frames: &mut [Frame], exports: AHashMap<String, Value>) {
        let importer_unit = frames.last().expect("frame stack empty").unit.clone();
        self.register_unit_funcs(&importer_unit, exports.iter());
        let importer = frames.last_mut().expect("frame stack empty");
        for (name, value) in exports {
            importer.env.insert(name, value);
        }
    }

    /// Executes `IMPORT`: consult the registry, or load, compile and push
    /// the module body as a new frame.
    fn op_import(&mut self, frames: &mut Vec<Frame>, path_idx: u32) -> Result<(), VmError> {
        let frame = frames.last().expect("frame stack empty");
        let import_path = frame.unit.name_at(path_idx).to_owned();
        let resolved = frame.unit.dir.join(&import_path);
        let canon = fs::canonicalize(&resolved)
            .map_err(|err| import_failure(&import_path, format!("Cannot resolve module: {err}")))?;

        match self.registry.state(&canon) {
            Some(ModuleState::Loaded(exports)) => {
                let exports = exports.clone();
                self.bind_exports(frames, exports);
                Ok(())
            }
            Some(ModuleState::Loading) => {
                // Import cycle: expose whatever the in-progress module has
                // defined so far; its body is not re-executed.
                let exports = snapshot_partial(frames, &canon);
                self.bind_exports(frames, exports);
                Ok(())
            }
            None => {
                let source = fs::read_to_string(&canon)
                    .map_err(|err| import_failure(&import_path, format!("Cannot read module: {err}")))?;
                let dir = canon.parent().map(Path::to_path_buf).unwrap_or_default();
                let unit = crate::run::compile_at(&source, &import_path, dir).map_err(|err| {
                    VmError::Fatal(Error::Import {
                        path: import_path.clone(),
                        inner: Box::new(err),
                    })
                })?;
                self.registry.begin(canon.clone());
                frames.push(Frame::top_level(
                    Rc::new(unit),
                    Env::default(),
                    FrameKind::Module {
                        path: canon,
                        import_path,
                    },
                ));
                Ok(())
            }
        }
    }
}

/// Builds the partial export set of a module frame that is still running
/// somewhere below on this frame stack (single-threaded, so it is always
/// found there).
fn snapshot_partial(frames: &[Frame], canon: &Path) -> AHashMap<String, Value> {
    for frame in frames.iter().rev() {
        let found = match &frame.kind {
            FrameKind::Module { path, .. } => path == canon,
            FrameKind::Top { path: Some(path) } => path == canon,
            _ => false,
        };
        if found {
            return partial_exports(&frame.exported, &frame.env);
        }
    }
    AHashMap::new()
}

/// Wraps a static failure in one `Import` layer per module frame it crosses.
fn wrap_imports(frames: &[Frame], mut err: Error) -> Error {
    for frame in frames.iter().rev() {
        if let FrameKind::Module { import_path, .. } = &frame.kind {
            err = Error::Import {
                path: import_path.clone(),
                inner: Box::new(err),
            };
        }
    }
    err
}

/// Unwinds a runtime error: appends one trace entry per live frame
/// (innermost first) and wraps import boundaries.
fn unwind(frames: &[Frame], mut err: RuntimeError) -> Error {
    for frame in frames.iter().rev() {
        err.trace.push(StackFrame {
            func_name: frame.trace_name().to_owned(),
            file: frame.unit.file.clone(),
            line: frame.line,
        });
    }
    wrap_imports(frames, Error::Runtime(err))
}

fn import_failure(path: &str, message: String) -> VmError {
    VmError::Fatal(Error::Import {
        path: path.to_owned(),
        inner: Box::new(Error::Runtime(RuntimeError::msg(message))),
    })
}
