//! Implementation of the `enter` builtin.

use crate::{
    error::{RunResult, RuntimeError},
    io::Console,
    value::Value,
};

/// Prints a prompt (no newline) and reads one line of input as a Str.
///
/// End of input yields the empty string.
pub(super) fn enter(prompt: &Value, console: &mut impl Console) -> RunResult<Value> {
    console.out(&prompt.display());
    let line = console
        .read_line()
        .map_err(|err| RuntimeError::msg(format!("Cannot read input: {err}")))?;
    Ok(Value::str(line.unwrap_or_default()))
}
