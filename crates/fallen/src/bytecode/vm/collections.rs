//! Indexing, list/dict mutation, length and iteration support.

use crate::{
    error::{RunResult, RuntimeError},
    value::{IterCursor, Value},
};

fn list_index(list_len: usize, index: &Value) -> RunResult<usize> {
    let Value::Int(raw) = index else {
        return Err(RuntimeError::msg(format!(
            "List index must be an int, got {}",
            index.type_name()
        )));
    };
    usize::try_from(*raw)
        .ok()
        .filter(|&idx| idx < list_len)
        .ok_or_else(|| RuntimeError::msg(format!("Index out of range: {raw} (len {list_len})")))
}

fn dict_key(index: &Value) -> RunResult<&str> {
    match index {
        Value::Str(key) => Ok(key),
        other => Err(RuntimeError::msg(format!(
            "Dict key must be a str, got {}",
            other.type_name()
        ))),
    }
}

/// `call name(index)`: list element, dict value, or 1-character string.
pub(super) fn index_get(container: &Value, index: &Value) -> RunResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let idx = list_index(items.len(), index)?;
            Ok(items[idx].clone())
        }
        Value::Dict(pairs) => {
            let key = dict_key(index)?;
            pairs
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| RuntimeError::msg(format!("Key not found: \"{key}\"")))
        }
        Value::Str(s) => {
            let Value::Int(raw) = index else {
                return Err(RuntimeError::msg(format!(
                    "String index must be an int, got {}",
                    index.type_name()
                )));
            };
            let ch = usize::try_from(*raw).ok().and_then(|idx| s.chars().nth(idx));
            match ch {
                Some(ch) => Ok(Value::str(ch.to_string())),
                None => Err(RuntimeError::msg(format!(
                    "Index out of range: {raw} (len {})",
                    s.chars().count()
                ))),
            }
        }
        other => Err(RuntimeError::msg(format!("Cannot index {}", other.type_name()))),
    }
}

/// `set name(index) to value` for lists and dicts.
pub(super) fn index_set(container: &Value, index: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let idx = list_index(items.len(), index)?;
            items[idx] = value;
            Ok(())
        }
        Value::Dict(pairs) => {
            let key = dict_key(index)?;
            pairs.borrow_mut().insert(key.to_owned(), value);
            Ok(())
        }
        other => Err(RuntimeError::msg(format!(
            "'set' expects a list or dict, got {}",
            other.type_name()
        ))),
    }
}

/// `add name(value)`: append to a list.
pub(super) fn list_append(container: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            items.borrow_mut().push(value);
            Ok(())
        }
        other => Err(RuntimeError::msg(format!("'add' expects a list, got {}", other.type_name()))),
    }
}

/// `insert name(index, value)`: insert into a list; inserting at `len` appends.
pub(super) fn list_insert(container: &Value, index: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let Value::Int(raw) = index else {
                return Err(RuntimeError::msg(format!(
                    "List index must be an int, got {}",
                    index.type_name()
                )));
            };
            let len = items.len();
            let idx = usize::try_from(*raw)
                .ok()
                .filter(|&idx| idx <= len)
                .ok_or_else(|| RuntimeError::msg(format!("Index out of range: {raw} (len {len})")))?;
            items.insert(idx, value);
            Ok(())
        }
        other => Err(RuntimeError::msg(format!(
            "'insert' expects a list, got {}",
            other.type_name()
        ))),
    }
}

/// `remove name(index)`: by position for lists, by key for dicts.
pub(super) fn remove_at(container: &Value, index: &Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let idx = list_index(items.len(), index)?;
            items.remove(idx);
            Ok(())
        }
        Value::Dict(pairs) => {
            let key = dict_key(index)?;
            // shift_remove keeps the remaining pairs in insertion order.
            pairs
                .borrow_mut()
                .shift_remove(key)
                .map(drop)
                .ok_or_else(|| RuntimeError::msg(format!("Key not found: \"{key}\"")))
        }
        other => Err(RuntimeError::msg(format!(
            "'remove' expects a list or dict, got {}",
            other.type_name()
        ))),
    }
}

/// Length of a string (in code points), list, or dict.
pub(super) fn length_of(value: &Value) -> RunResult<Value> {
    let len = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Dict(pairs) => pairs.borrow().len(),
        other => {
            return Err(RuntimeError::msg(format!(
                "'amount' expects a str, list, or dict, got {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

/// Snapshots an iterable into a `FOR_START` cursor: list elements, dict keys,
/// or 1-character strings.
pub(super) fn iteration_cursor(value: &Value) -> RunResult<IterCursor> {
    let items = match value {
        Value::List(items) => items.borrow().clone(),
        Value::Dict(pairs) => pairs.borrow().keys().map(|key| Value::str(key.as_str())).collect(),
        Value::Str(s) => s.chars().map(|ch| Value::str(ch.to_string())).collect(),
        other => {
            return Err(RuntimeError::msg(format!("Cannot iterate over {}", other.type_name())));
        }
    };
    Ok(IterCursor { items, pos: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_indexing_bounds() {
        let list = Value::list(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(index_get(&list, &Value::Int(1)).unwrap(), Value::Int(20));
        let err = index_get(&list, &Value::Int(-1)).unwrap_err();
        assert_eq!(err.message, "Index out of range: -1 (len 2)");
        let err = index_get(&list, &Value::Int(2)).unwrap_err();
        assert_eq!(err.message, "Index out of range: 2 (len 2)");
    }

    #[test]
    fn string_indexing_yields_one_character_strings() {
        let s = Value::str("héllo");
        assert_eq!(index_get(&s, &Value::Int(1)).unwrap(), Value::str("é"));
        assert_eq!(length_of(&s).unwrap(), Value::Int(5));
    }

    #[test]
    fn dict_remove_keeps_order() {
        let dict = Value::dict(
            [
                ("a".to_owned(), Value::Int(1)),
                ("b".to_owned(), Value::Int(2)),
                ("c".to_owned(), Value::Int(3)),
            ]
            .into_iter()
            .collect(),
        );
        remove_at(&dict, &Value::str("b")).unwrap();
        assert_eq!(dict.display(), "{\"a\": 1, \"c\": 3}");
    }

    #[test]
    fn cursor_snapshots_elements() {
        let list = Value::list(vec![Value::Int(1)]);
        let cursor = iteration_cursor(&list).unwrap();
        if let Value::List(items) = &list {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(cursor.items.len(), 1);
    }
}
