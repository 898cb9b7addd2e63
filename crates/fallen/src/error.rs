//! Public error type for the Fallen pipeline.
//!
//! Every failure a host can observe is an [`Error`]: lexing, parsing and
//! compilation stop before execution and carry a source position, while
//! runtime failures carry the raising instruction pointer and a stack trace
//! accumulated during frame unwinding. Errors that escape a module body are
//! wrapped in [`Error::Import`] so the import chain stays visible.

use std::fmt;

/// Result alias for fallible runtime operations inside the VM and builtins.
pub(crate) type RunResult<T> = Result<T, RuntimeError>;

/// One entry in a runtime stack trace.
///
/// Frames are recorded innermost first. Top-level bodies (the script main
/// body, a module body, a REPL input) are named `<main>`; function frames
/// carry the function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name, or `<main>` for a top-level body.
    pub func_name: String,
    /// Source file the frame was executing.
    pub file: String,
    /// 1-based source line last executed in the frame.
    pub line: u32,
}

/// A runtime failure raised by a VM instruction or a builtin.
///
/// The VM fills `ip` at the raising dispatch and appends one [`StackFrame`]
/// per live frame while unwinding.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Instruction index at which the error was raised.
    pub ip: usize,
    /// Stack trace, innermost frame first.
    pub trace: Vec<StackFrame>,
}

impl RuntimeError {
    /// Creates a runtime error with no position information yet.
    ///
    /// The VM stamps `ip` and the trace during unwinding; builtins and value
    /// operations only provide the message.
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ip: 0,
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runtime error: {}", self.message)?;
        write!(f, "  ip={:04x}", self.ip)?;
        for frame in &self.trace {
            write!(f, "\n  at func {} ({}:{})", frame.func_name, frame.file, frame.line)?;
        }
        Ok(())
    }
}

/// Any failure surfaced by the Fallen pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The lexer rejected the source text.
    Lex {
        /// Source file being lexed.
        file: String,
        /// 1-based line of the offending character.
        line: u32,
        /// Description of the failure.
        message: String,
    },
    /// The parser rejected the token stream.
    Parse {
        /// Source file being parsed.
        file: String,
        /// 1-based line of the offending token.
        line: u32,
        /// Description of the failure.
        message: String,
    },
    /// The compiler rejected the AST (e.g. `stop` outside a loop).
    Compile {
        /// Source file being compiled.
        file: String,
        /// 1-based line of the offending statement.
        line: u32,
        /// Description of the failure.
        message: String,
    },
    /// An instruction or builtin failed during execution.
    Runtime(RuntimeError),
    /// A failure crossed an `import` boundary.
    ///
    /// `path` is the import path as written in source. The inner error keeps
    /// its own formatting, so nested import failures render as a chain of
    /// prefix lines.
    Import {
        /// Import path as written in the importing source file.
        path: String,
        /// The failure that occurred while loading or running the module.
        inner: Box<Error>,
    },
}

impl Error {
    pub(crate) fn lex(file: &str, line: u32, message: impl Into<String>) -> Self {
        Self::Lex {
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn parse(file: &str, line: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn compile(file: &str, line: u32, message: impl Into<String>) -> Self {
        Self::Compile {
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }

    /// Returns the runtime stack trace if this is (possibly an import-wrapped)
    /// runtime error.
    #[must_use]
    pub fn runtime_trace(&self) -> Option<&[StackFrame]> {
        match self {
            Self::Runtime(err) => Some(&err.trace),
            Self::Import { inner, .. } => inner.runtime_trace(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex { file, line, message } => {
                write!(f, "Lex error: {message} ({file}:{line})")
            }
            Self::Parse { file, line, message } => {
                write!(f, "Parse error: {message} ({file}:{line})")
            }
            Self::Compile { file, line, message } => {
                write!(f, "Compile error: {message} ({file}:{line})")
            }
            Self::Runtime(err) => err.fmt(f),
            Self::Import { path, inner } => {
                writeln!(f, "Import error in \"{path}\":")?;
                inner.fmt(f)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<RuntimeError> for Error {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_display_format() {
        let err = RuntimeError {
            message: "Division by zero".to_owned(),
            ip: 0x2a,
            trace: vec![
                StackFrame {
                    func_name: "f".to_owned(),
                    file: "prog.fallen".to_owned(),
                    line: 3,
                },
                StackFrame {
                    func_name: "<main>".to_owned(),
                    file: "prog.fallen".to_owned(),
                    line: 7,
                },
            ],
        };
        assert_eq!(
            Error::Runtime(err).to_string(),
            "Runtime error: Division by zero\n  ip=002a\n  at func f (prog.fallen:3)\n  at func <main> (prog.fallen:7)"
        );
    }

    #[test]
    fn import_display_prefixes_inner_lines() {
        let inner = Error::Runtime(RuntimeError {
            message: "boom".to_owned(),
            ip: 1,
            trace: vec![],
        });
        let err = Error::Import {
            path: "lib.fallen".to_owned(),
            inner: Box::new(inner),
        };
        assert_eq!(
            err.to_string(),
            "Import error in \"lib.fallen\":\nRuntime error: boom\n  ip=0001"
        );
    }
}
