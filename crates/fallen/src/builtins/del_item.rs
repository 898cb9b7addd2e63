//! Implementation of the `del` builtin.

use crate::{
    error::{RunResult, RuntimeError},
    value::Value,
};

/// Pops and returns the last element of a List.
pub(super) fn del(value: &Value) -> RunResult<Value> {
    match value {
        Value::List(items) => items
            .borrow_mut()
            .pop()
            .ok_or_else(|| RuntimeError::msg("Cannot del from an empty list")),
        other => Err(RuntimeError::msg(format!(
            "'del' expects a list, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn del_pops_the_last_element() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(del(&list).unwrap(), Value::Int(2));
        assert_eq!(list.display(), "[1]");
        del(&list).unwrap();
        let err = del(&list).unwrap_err();
        assert_eq!(err.message, "Cannot del from an empty list");
    }
}
