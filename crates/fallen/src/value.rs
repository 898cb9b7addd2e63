//! Runtime value model.
//!
//! Scalars (`Null`, `Bool`, `Int`, `Float`) are stored inline and copied by
//! value. Containers (`Str`, `List`, `Dict`) are reference-counted shared
//! handles: cloning a [`Value`] clones the handle, so mutation through one
//! binding is visible through every alias. No value variant can contain a
//! direct back-reference to itself (functions are indices into an immutable
//! [`Unit`]), so reference cycles are structurally impossible.

use std::{cell::RefCell, cmp::Ordering, fmt::Write as _, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;
use strum::{Display, IntoStaticStr};

use crate::{bytecode::Unit, error::RuntimeError};

/// A shared, mutable, insertion-ordered list of values.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// A shared, mutable, string-keyed, insertion-ordered dictionary.
///
/// Keys are few per dict in practice; `IndexMap` gives insertion order with
/// hashed lookup.
pub type DictRef = Rc<RefCell<IndexMap<String, Value>>>;

/// A variable environment: one per frame, mapping names to values.
pub type Env = AHashMap<String, Value>;

/// The kind of a runtime value, used for type-marker checks and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
    Func,
}

/// A reference to a compiled function: the unit that owns its bytecode plus
/// its index in that unit's function table.
#[derive(Debug, Clone)]
pub struct FuncRef {
    /// The bytecode unit the function was compiled into.
    pub unit: Rc<Unit>,
    /// Index into [`Unit::functions`].
    pub index: usize,
}

impl FuncRef {
    /// The function's declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.unit.functions[self.index].name
    }
}

/// Internal iteration state pushed by `FOR_START`.
///
/// The cursor snapshots the iterable's elements, so mutating the underlying
/// container while the loop runs does not affect the iteration.
#[derive(Debug, Clone)]
pub struct IterCursor {
    pub(crate) items: Vec<Value>,
    pub(crate) pos: usize,
}

/// A Fallen runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Immutable shared string storage (code-point transparent).
    Str(Rc<str>),
    List(ListRef),
    Dict(DictRef),
    /// A reference into an immutable bytecode unit.
    Func(FuncRef),
    /// VM-internal loop cursor; never observable from Fallen code.
    Cursor(Box<IterCursor>),
}

impl Value {
    /// Builds a `Str` value from anything string-like.
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// Builds a `List` value from owned elements.
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// Builds a `Dict` value from owned pairs.
    #[must_use]
    pub fn dict(pairs: IndexMap<String, Self>) -> Self {
        Self::Dict(Rc::new(RefCell::new(pairs)))
    }

    /// The kind tag of this value.
    ///
    /// # Panics
    /// Panics on the internal `Cursor` variant, which never reaches
    /// kind-inspecting code.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Bool(_) => Kind::Bool,
            Self::Int(_) => Kind::Int,
            Self::Float(_) => Kind::Float,
            Self::Str(_) => Kind::Str,
            Self::List(_) => Kind::List,
            Self::Dict(_) => Kind::Dict,
            Self::Func(_) => Kind::Func,
            Self::Cursor(_) => panic!("loop cursor escaped the VM"),
        }
    }

    /// The kind name for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().into()
    }

    /// Truthiness is defined for `Bool` only.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric ordering: Int/Int, Float/Float, and Int↔Float (widened).
    /// Returns `None` for every other pair; the caller raises.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    /// Human-readable rendering used by `write`: strings are bare.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = String::new();
        self.fmt_value(&mut out, false);
        out
    }

    /// Source-like rendering used inside containers and error messages:
    /// strings are double-quoted.
    #[must_use]
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.fmt_value(&mut out, true);
        out
    }

    fn fmt_value(&self, out: &mut String, quoted: bool) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Float(x) => {
                let mut buffer = ryu::Buffer::new();
                out.push_str(buffer.format(*x));
            }
            Self::Str(s) => {
                if quoted {
                    out.push('"');
                    for ch in s.chars() {
                        match ch {
                            '\\' => out.push_str("\\\\"),
                            '"' => out.push_str("\\\""),
                            '\n' => out.push_str("\\n"),
                            '\t' => out.push_str("\\t"),
                            _ => out.push(ch),
                        }
                    }
                    out.push('"');
                } else {
                    out.push_str(s);
                }
            }
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.fmt_value(out, true);
                }
                out.push(']');
            }
            Self::Dict(pairs) => {
                out.push('{');
                for (i, (key, value)) in pairs.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "\"{key}\": ");
                    value.fmt_value(out, true);
                }
                out.push('}');
            }
            Self::Func(func) => {
                let _ = write!(out, "<func {}>", func.name());
            }
            Self::Cursor(_) => out.push_str("<cursor>"),
        }
    }
}

/// Structural equality.
///
/// Containers compare deeply (with a same-handle fast path); Int↔Float
/// comparisons widen to float. Values of different non-numeric kinds are
/// unequal rather than an error.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Dict(a), Self::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w))
            }
            (Self::Func(a), Self::Func(b)) => Rc::ptr_eq(&a.unit, &b.unit) && a.index == b.index,
            _ => false,
        }
    }
}

/// Raises the error used when ordering is requested for a non-numeric pair.
pub(crate) fn ordering_error(lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::msg(format!("Cannot compare {} and {}", lhs.type_name(), rhs.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliased_lists_share_storage() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = a.clone();
        if let Value::List(items) = &b {
            items.borrow_mut().push(Value::Int(3));
        }
        assert_eq!(a.display(), "[1, 2, 3]");
    }

    #[test]
    fn equality_is_structural_and_widening() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::str("1"));
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_numeric_only() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::str("a").compare(&Value::str("b")), None);
    }

    #[test]
    fn display_and_repr_quote_strings_differently() {
        let v = Value::str("hi");
        assert_eq!(v.display(), "hi");
        assert_eq!(v.repr(), "\"hi\"");
        let list = Value::list(vec![Value::str("hi"), Value::Float(2.5)]);
        assert_eq!(list.display(), "[\"hi\", 2.5]");
    }
}
