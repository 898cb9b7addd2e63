//! Arithmetic, comparison and unary operations.

use std::cmp::Ordering;

use crate::{
    bytecode::op::Opcode,
    error::{RunResult, RuntimeError},
    value::{Value, ordering_error},
};

/// Applies a binary arithmetic or comparison opcode to two popped operands.
pub(super) fn binary(op: Opcode, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    match op {
        Opcode::Add => arithmetic(lhs, rhs, "+", i64::checked_add, |a, b| a + b),
        Opcode::Sub => arithmetic(lhs, rhs, "-", i64::checked_sub, |a, b| a - b),
        Opcode::Mul => arithmetic(lhs, rhs, "*", i64::checked_mul, |a, b| a * b),
        Opcode::Div => divide(lhs, rhs),
        Opcode::Eq => Ok(Value::Bool(lhs == rhs)),
        Opcode::Ne => Ok(Value::Bool(lhs != rhs)),
        Opcode::Lt => ordered(lhs, rhs, |ord| ord == Ordering::Less),
        Opcode::Le => ordered(lhs, rhs, |ord| ord != Ordering::Greater),
        Opcode::Gt => ordered(lhs, rhs, |ord| ord == Ordering::Greater),
        Opcode::Ge => ordered(lhs, rhs, |ord| ord != Ordering::Less),
        _ => unreachable!("not a binary opcode: {op:?}"),
    }
}

fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    symbol: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> RunResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::msg("Integer overflow")),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (Value::Str(a), Value::Str(b)) if symbol == "+" => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::str(joined))
        }
        _ => Err(RuntimeError::msg(format!(
            "Unsupported operand types for {symbol}: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

/// Division: Int/Int truncates toward zero; any zero divisor is an error.
fn divide(lhs: &Value, rhs: &Value) -> RunResult<Value> {
    let zero = match rhs {
        Value::Int(b) => *b == 0,
        Value::Float(b) => *b == 0.0,
        _ => false,
    };
    if zero && matches!(lhs, Value::Int(_) | Value::Float(_)) {
        return Err(RuntimeError::msg("Division by zero"));
    }
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_div(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::msg("Integer overflow")),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
        _ => Err(RuntimeError::msg(format!(
            "Unsupported operand types for /: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn ordered(lhs: &Value, rhs: &Value, test: fn(Ordering) -> bool) -> RunResult<Value> {
    match lhs.compare(rhs) {
        Some(ord) => Ok(Value::Bool(test(ord))),
        None => Err(ordering_error(lhs, rhs)),
    }
}

/// Unary negation for Int and Float.
pub(super) fn negate(operand: &Value) -> RunResult<Value> {
    match operand {
        Value::Int(v) => v
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::msg("Integer overflow")),
        Value::Float(v) => Ok(Value::Float(-v)),
        other => Err(RuntimeError::msg(format!(
            "Unsupported operand type for unary -: {}",
            other.type_name()
        ))),
    }
}

/// Logical `not`; defined for Bool only.
pub(super) fn logical_not(operand: &Value) -> RunResult<Value> {
    operand
        .as_bool()
        .map(|b| Value::Bool(!b))
        .ok_or_else(|| RuntimeError::msg(format!("Operand of 'not' must be a bool, got {}", operand.type_name())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_float_widening() {
        assert_eq!(binary(Opcode::Add, &Value::Int(1), &Value::Float(0.5)).unwrap(), Value::Float(1.5));
        assert_eq!(binary(Opcode::Mul, &Value::Int(3), &Value::Int(4)).unwrap(), Value::Int(12));
    }

    #[test]
    fn int_division_truncates_toward_zero() {
        assert_eq!(binary(Opcode::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(binary(Opcode::Div, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-3));
    }

    #[test]
    fn division_by_zero_is_an_error_for_both_kinds() {
        let err = binary(Opcode::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.message, "Division by zero");
        let err = binary(Opcode::Div, &Value::Float(1.0), &Value::Float(0.0)).unwrap_err();
        assert_eq!(err.message, "Division by zero");
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            binary(Opcode::Add, &Value::str("ab"), &Value::str("cd")).unwrap(),
            Value::str("abcd")
        );
        let err = binary(Opcode::Sub, &Value::str("ab"), &Value::str("cd")).unwrap_err();
        assert_eq!(err.message, "Unsupported operand types for -: str and str");
    }

    #[test]
    fn ordering_rejects_non_numeric_pairs() {
        let err = binary(Opcode::Lt, &Value::str("a"), &Value::str("b")).unwrap_err();
        assert_eq!(err.message, "Cannot compare str and str");
    }
}
