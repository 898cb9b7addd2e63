//! Implementation of the `write` builtin.

use crate::{error::RunResult, io::Console, value::Value};

/// Prints one value in its human-readable form followed by a newline.
pub(super) fn write(value: &Value, console: &mut impl Console) -> RunResult<Value> {
    console.out(&value.display());
    console.out("\n");
    Ok(Value::Null)
}
