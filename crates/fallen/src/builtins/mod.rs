//! Host-provided builtin functions.
//!
//! Builtins resolve before user functions at `CALL` time, by name, through
//! the strum-derived `FromStr` on [`Builtin`]. Each builtin lives in its own
//! submodule. `amount` is not here: the compiler lowers it to the `LEN`
//! opcode (and rejects any other arity), so no `CALL` ever names it.

mod conv;
mod del_item;
mod enter;
mod files;
mod write;

use std::path::Path;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    error::{RunResult, RuntimeError},
    io::Console,
    value::Value,
};

/// Every builtin function, by call name.
///
/// The strum derives render names in snake_case, matching the surface
/// language (`ConvInt` -> `conv_int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Builtin {
    Write,
    Enter,
    ConvInt,
    ConvFloat,
    ConvBool,
    TryConvInt,
    TryConvFloat,
    TryConvBool,
    Del,
    Save,
    Change,
    Read,
}

impl Builtin {
    /// Number of arguments the builtin requires.
    fn arity(self) -> usize {
        match self {
            Self::Save | Self::Change => 2,
            _ => 1,
        }
    }

    /// Calls this builtin with already-popped arguments (in call order).
    ///
    /// `program_dir` anchors relative paths for the file builtins; `console`
    /// carries `write` output and `enter` input.
    pub fn call(self, args: Vec<Value>, program_dir: &Path, console: &mut impl Console) -> RunResult<Value> {
        if args.len() != self.arity() {
            return Err(RuntimeError::msg(format!(
                "Builtin '{self}' takes {} arguments but {} were given",
                self.arity(),
                args.len()
            )));
        }
        let mut args = args.into_iter();
        let first = args.next().expect("arity checked above");
        match self {
            Self::Write => write::write(&first, console),
            Self::Enter => enter::enter(&first, console),
            Self::ConvInt => conv::conv_int(&first),
            Self::ConvFloat => conv::conv_float(&first),
            Self::ConvBool => conv::conv_bool(&first),
            Self::TryConvInt => Ok(conv::conv_int(&first).unwrap_or(Value::Null)),
            Self::TryConvFloat => Ok(conv::conv_float(&first).unwrap_or(Value::Null)),
            Self::TryConvBool => Ok(conv::conv_bool(&first).unwrap_or(Value::Null)),
            Self::Del => del_item::del(&first),
            Self::Save => files::save(&first, &args.next().expect("arity checked above"), program_dir),
            Self::Change => files::change(&first, &args.next().expect("arity checked above"), program_dir),
            Self::Read => files::read(&first, program_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn names_resolve_like_source_calls() {
        assert_eq!(Builtin::from_str("write"), Ok(Builtin::Write));
        assert_eq!(Builtin::from_str("conv_int"), Ok(Builtin::ConvInt));
        assert_eq!(Builtin::from_str("try_conv_bool"), Ok(Builtin::TryConvBool));
        assert_eq!(Builtin::from_str("del"), Ok(Builtin::Del));
        assert!(Builtin::from_str("no_such_builtin").is_err());
    }
}
