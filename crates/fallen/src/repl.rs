//! Persistent REPL session support.
//!
//! `ReplSession` keeps interpreter state across `execute()` calls so
//! interactive snippets share variables and functions: one VM (and therefore
//! one module registry and trace flag) plus the accumulated top-level
//! environment. Every error kind is caught per input; the environment
//! survives failed inputs.

use std::{env, path::PathBuf};

use crate::{
    bytecode::Vm,
    error::Error,
    io::Console,
    run::compile_at,
    value::Env,
};

/// A persistent interactive session.
#[derive(Debug)]
pub struct ReplSession {
    vm: Vm,
    env: Env,
    /// Number of inputs executed, used to name them in errors and traces.
    inputs: usize,
}

impl ReplSession {
    /// Creates a session whose imports and file builtins resolve against
    /// `program_dir`.
    pub fn new(program_dir: impl Into<PathBuf>) -> Self {
        Self {
            vm: Vm::new(program_dir),
            env: Env::default(),
            inputs: 0,
        }
    }

    /// Creates a session anchored at the current working directory.
    #[must_use]
    pub fn from_current_dir() -> Self {
        Self::new(env::current_dir().unwrap_or_default())
    }

    /// Compiles and runs one input against the accumulated environment.
    ///
    /// On success the environment (including functions the input defined) is
    /// carried into the next call; on error it is left as it was.
    pub fn execute(&mut self, source: &str, console: &mut impl Console) -> Result<(), Error> {
        self.inputs += 1;
        let file = format!("<repl:{}>", self.inputs);
        let unit = compile_at(source, &file, self.vm.program_dir().to_path_buf())?;
        let env = self.vm.run_unit(&std::rc::Rc::new(unit), self.env.clone(), console)?;
        self.env = env;
        Ok(())
    }

    /// The accumulated top-level environment.
    #[must_use]
    pub fn env(&self) -> &Env {
        &self.env
    }
}
