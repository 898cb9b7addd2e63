//! File I/O builtins: `save`, `change`, `read`.
//!
//! Relative paths resolve against the running program's directory, not the
//! current working directory. Handles are opened and closed within a single
//! call, so they are released on both success and failure.

use std::{
    fs::OpenOptions,
    io::Write as _,
    path::{Path, PathBuf},
};

use crate::{
    error::{RunResult, RuntimeError},
    value::Value,
};

fn resolve(path: &Value, program_dir: &Path) -> RunResult<PathBuf> {
    match path {
        Value::Str(s) => {
            let p = Path::new(&**s);
            if p.is_absolute() {
                Ok(p.to_path_buf())
            } else {
                Ok(program_dir.join(p))
            }
        }
        other => Err(RuntimeError::msg(format!(
            "File path must be a str, got {}",
            other.type_name()
        ))),
    }
}

fn text_of(value: &Value) -> RunResult<&str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::msg(format!(
            "File contents must be a str, got {}",
            other.type_name()
        ))),
    }
}

/// Writes (creating or truncating) a file.
pub(super) fn save(path: &Value, text: &Value, program_dir: &Path) -> RunResult<Value> {
    let resolved = resolve(path, program_dir)?;
    let text = text_of(text)?;
    std::fs::write(&resolved, text)
        .map_err(|err| RuntimeError::msg(format!("Cannot write file \"{}\": {err}", resolved.display())))?;
    Ok(Value::Null)
}

/// Appends to a file, creating it if missing.
pub(super) fn change(path: &Value, text: &Value, program_dir: &Path) -> RunResult<Value> {
    let resolved = resolve(path, program_dir)?;
    let text = text_of(text)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&resolved)
        .map_err(|err| RuntimeError::msg(format!("Cannot write file \"{}\": {err}", resolved.display())))?;
    file.write_all(text.as_bytes())
        .map_err(|err| RuntimeError::msg(format!("Cannot write file \"{}\": {err}", resolved.display())))?;
    Ok(Value::Null)
}

/// Reads a whole file as a Str.
pub(super) fn read(path: &Value, program_dir: &Path) -> RunResult<Value> {
    let resolved = resolve(path, program_dir)?;
    let text = std::fs::read_to_string(&resolved)
        .map_err(|err| RuntimeError::msg(format!("Cannot read file \"{}\": {err}", resolved.display())))?;
    Ok(Value::str(text))
}
