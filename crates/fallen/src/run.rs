//! One-shot pipeline entry points.
//!
//! These helpers tie the stages together for hosts and tests: parse, parse
//! plus compile, and parse-compile-run with a fresh VM. The REPL keeps its
//! own VM instead (see [`crate::repl::ReplSession`]).

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    ast::Program,
    bytecode::{Unit, Vm, compile},
    error::{Error, RuntimeError},
    io::Console,
    parse::parse_tokens,
    value::Env,
};

/// Lexes and parses a source text.
pub fn parse_source(source: &str, file: &str) -> Result<Program, Error> {
    let tokens = crate::lex::tokenize(source).map_err(|err| Error::lex(file, err.line, err.message))?;
    parse_tokens(tokens).map_err(|err| Error::parse(file, err.line, err.message))
}

/// Parses and compiles a source text, with imports resolving against `dir`.
pub(crate) fn compile_at(source: &str, file: &str, dir: PathBuf) -> Result<Unit, Error> {
    let program = parse_source(source, file)?;
    compile(&program, file, dir).map_err(|err| Error::compile(file, err.line, err.message))
}

/// Parses and compiles a source text; imports resolve against the file's
/// parent directory.
pub fn compile_source(source: &str, file: &str) -> Result<Unit, Error> {
    let dir = Path::new(file).parent().map(Path::to_path_buf).unwrap_or_default();
    compile_at(source, file, dir)
}

/// Compiles and runs a source text in a fresh VM.
///
/// `program_dir` anchors both imports and the file builtins. Returns the
/// final top-level environment.
pub fn run_source(
    source: &str,
    file: &str,
    program_dir: impl Into<PathBuf>,
    console: &mut impl Console,
) -> Result<Env, Error> {
    let program_dir = program_dir.into();
    let unit = Rc::new(compile_at(source, file, program_dir.clone())?);
    let mut vm = Vm::new(program_dir);
    vm.run_unit(&unit, Env::default(), console)
}

/// Reads, compiles and runs a script file.
///
/// The script is registered in the module registry under its canonical path,
/// so an import cycle reaching back into it resolves instead of re-running
/// the script body.
pub fn run_file(path: impl AsRef<Path>, console: &mut impl Console) -> Result<Env, Error> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let canon = fs::canonicalize(path)
        .map_err(|err| Error::Runtime(RuntimeError::msg(format!("Cannot read file \"{display}\": {err}"))))?;
    let source = fs::read_to_string(&canon)
        .map_err(|err| Error::Runtime(RuntimeError::msg(format!("Cannot read file \"{display}\": {err}"))))?;
    let program_dir = canon.parent().map(Path::to_path_buf).unwrap_or_default();
    let unit = Rc::new(compile_at(&source, &display, program_dir.clone())?);
    let mut vm = Vm::new(program_dir);
    vm.run_main(&unit, Env::default(), Some(canon), console)
}
