//! Strict conversions: `conv_int`, `conv_float`, `conv_bool`.
//!
//! The `try_conv_*` variants are the same conversions with the error mapped
//! to `Null` by the dispatcher.

use crate::{
    error::{RunResult, RuntimeError},
    value::Value,
};

fn failure(target: &str, value: &Value) -> RuntimeError {
    RuntimeError::msg(format!("Cannot convert to {target}: {}", value.repr()))
}

/// Int from Int, Float (truncating toward zero) or Str.
pub(super) fn conv_int(value: &Value) -> RunResult<Value> {
    match value {
        Value::Int(v) => Ok(Value::Int(*v)),
        Value::Float(v) => {
            let truncated = v.trunc();
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(failure("int", value))
            }
        }
        Value::Str(s) => s.parse::<i64>().map(Value::Int).map_err(|_| failure("int", value)),
        _ => Err(failure("int", value)),
    }
}

/// Float from Int, Float or Str.
pub(super) fn conv_float(value: &Value) -> RunResult<Value> {
    match value {
        Value::Int(v) => Ok(Value::Float(*v as f64)),
        Value::Float(v) => Ok(Value::Float(*v)),
        Value::Str(s) => s
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| failure("float", value)),
        _ => Err(failure("float", value)),
    }
}

/// Bool from Bool, the exact strings `"true"`/`"false"`, or numeric
/// zero/nonzero.
pub(super) fn conv_bool(value: &Value) -> RunResult<Value> {
    match value {
        Value::Bool(v) => Ok(Value::Bool(*v)),
        Value::Str(s) => match &**s {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(failure("bool", value)),
        },
        Value::Int(v) => Ok(Value::Bool(*v != 0)),
        Value::Float(v) => Ok(Value::Bool(*v != 0.0)),
        _ => Err(failure("bool", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_conversions() {
        assert_eq!(conv_int(&Value::str("42")).unwrap(), Value::Int(42));
        assert_eq!(conv_int(&Value::Float(3.9)).unwrap(), Value::Int(3));
        assert_eq!(conv_int(&Value::Float(-3.9)).unwrap(), Value::Int(-3));
        let err = conv_int(&Value::str("abc")).unwrap_err();
        assert_eq!(err.message, "Cannot convert to int: \"abc\"");
        assert!(conv_int(&Value::Bool(true)).is_err());
    }

    #[test]
    fn bool_conversions_are_case_sensitive() {
        assert_eq!(conv_bool(&Value::str("true")).unwrap(), Value::Bool(true));
        assert!(conv_bool(&Value::str("True")).is_err());
        assert_eq!(conv_bool(&Value::Int(0)).unwrap(), Value::Bool(false));
        assert_eq!(conv_bool(&Value::Float(0.5)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn float_conversions() {
        assert_eq!(conv_float(&Value::Int(2)).unwrap(), Value::Float(2.0));
        assert_eq!(conv_float(&Value::str("2.5")).unwrap(), Value::Float(2.5));
        assert!(conv_float(&Value::list(vec![])).is_err());
    }
}
