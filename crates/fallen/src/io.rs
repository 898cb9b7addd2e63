//! Host I/O seam for the interpreter.
//!
//! All user-visible output flows through the [`Console`] trait: `write` and
//! `enter` prompts use the stdout sink, trace lines use the diagnostic sink,
//! and `enter` reads lines through the input method. Hosts and tests swap
//! implementations to capture or suppress everything.

use std::{
    collections::VecDeque,
    io::{self, Write as _},
};

/// Handles output and line input for a running program.
pub trait Console {
    /// Writes program output (no separators or terminators are added).
    fn out(&mut self, text: &str);

    /// Writes one diagnostic line (trace output). Implementations append the
    /// line terminator themselves.
    fn diag(&mut self, line: &str);

    /// Reads one line of input without its trailing newline.
    ///
    /// Returns `Ok(None)` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Default console: stdout for output, stderr for diagnostics, stdin for
/// input.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn out(&mut self, text: &str) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn diag(&mut self, line: &str) {
        eprintln!("{line}");
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        let read = io::stdin().read_line(&mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\r', '\n']).to_owned()))
    }
}

/// Console that collects output and diagnostics into strings and serves
/// input from a scripted queue.
///
/// The workhorse of the test suites.
#[derive(Debug, Default)]
pub struct CollectConsole {
    out: String,
    diag: String,
    input: VecDeque<String>,
}

impl CollectConsole {
    /// Creates an empty collector with no scripted input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector whose `read_line` serves these lines in order.
    #[must_use]
    pub fn with_input(lines: &[&str]) -> Self {
        Self {
            input: lines.iter().map(|&l| l.to_owned()).collect(),
            ..Self::default()
        }
    }

    /// Everything written to the stdout sink so far.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.out
    }

    /// Everything written to the diagnostic sink so far.
    #[must_use]
    pub fn diagnostics(&self) -> &str {
        &self.diag
    }

    /// Number of scripted input lines not yet consumed.
    #[must_use]
    pub fn remaining_input(&self) -> usize {
        self.input.len()
    }
}

impl Console for CollectConsole {
    fn out(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn diag(&mut self, line: &str) {
        self.diag.push_str(line);
        self.diag.push('\n');
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.input.pop_front())
    }
}

/// Console that discards all output and reports end of input immediately.
#[derive(Debug, Default)]
pub struct SilentConsole;

impl Console for SilentConsole {
    fn out(&mut self, _text: &str) {}

    fn diag(&mut self, _line: &str) {}

    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(None)
    }
}
