//! Fallen: a small imperative scripting language with typed-marker
//! assignment, first-class functions, lists and dictionaries, pattern
//! matching, and a module system with privacy and exports.
//!
//! The crate ships the full pipeline: lexer → parser → bytecode compiler →
//! stack-based virtual machine, plus a REPL session and a module loader.
//! See [`run_source`] / [`run_file`] for one-shot execution and
//! [`ReplSession`] for interactive use.

mod ast;
mod builtins;
mod bytecode;
mod error;
mod io;
mod lex;
mod modules;
mod parse;
mod repl;
mod run;
mod value;

pub use crate::{
    ast::{Program, TypeMarker},
    bytecode::{CompileError, FuncSpec, Instr, Opcode, ParamSpec, Unit, Vm},
    error::{Error, RuntimeError, StackFrame},
    io::{CollectConsole, Console, SilentConsole, StdConsole},
    lex::{LexError, Token, TokenKind, tokenize},
    parse::{ParseError, parse},
    repl::ReplSession,
    run::{compile_source, parse_source, run_file, run_source},
    value::{DictRef, Env, FuncRef, IterCursor, Kind, ListRef, Value},
};
