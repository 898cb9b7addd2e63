//! Module registry: load-once semantics and export sets.
//!
//! The registry is owned by the VM (created at VM start, dropped with it) and
//! keyed by canonicalized path. A module is `Loading` from the moment its
//! body starts executing until its `HALT`; re-imports observed during that
//! window resolve against the partially populated exports instead of
//! re-executing the body, which is what makes import cycles safe.

use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::{
    error::{RunResult, RuntimeError},
    value::{Env, Value},
};

/// Execution state of a known module.
#[derive(Debug)]
pub(crate) enum ModuleState {
    /// The module body is currently executing (or died mid-execution).
    Loading,
    /// The module finished; these are its public names.
    Loaded(AHashMap<String, Value>),
}

/// Process-wide map of modules, living as long as the VM.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    modules: AHashMap<PathBuf, ModuleState>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a module as executing.
    pub fn begin(&mut self, path: PathBuf) {
        self.modules.insert(path, ModuleState::Loading);
    }

    /// Marks a module as finished with its computed public set.
    pub fn finish(&mut self, path: &Path, exports: AHashMap<String, Value>) {
        self.modules.insert(path.to_path_buf(), ModuleState::Loaded(exports));
    }

    pub fn state(&self, path: &Path) -> Option<&ModuleState> {
        self.modules.get(path)
    }
}

/// Whether a name is visible in a module's default public set.
///
/// Underscore-prefixed names are private by convention; `@`-prefixed names
/// are compiler temporaries and never visible.
fn is_public(name: &str) -> bool {
    !name.starts_with('_') && !name.starts_with('@')
}

/// Computes a finished module's public set.
///
/// If the module executed at least one `export`, the public set is exactly
/// those names; a name exported but never defined is a runtime error.
/// Otherwise every non-underscore name in the environment is public.
pub(crate) fn compute_exports(exported: &[String], env: &Env) -> RunResult<AHashMap<String, Value>> {
    if exported.is_empty() {
        return Ok(env
            .iter()
            .filter(|(name, _)| is_public(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect());
    }
    let mut exports = AHashMap::with_capacity(exported.len());
    for name in exported {
        let value = env
            .get(name)
            .ok_or_else(|| RuntimeError::msg(format!("Exported name '{name}' is not defined")))?;
        exports.insert(name.clone(), value.clone());
    }
    Ok(exports)
}

/// Computes the partial public set of a module that is still `Loading`.
///
/// Used when an import cycle re-enters a module mid-execution: names that
/// were exported but not yet assigned are simply absent.
pub(crate) fn partial_exports(exported: &[String], env: &Env) -> AHashMap<String, Value> {
    if exported.is_empty() {
        return env
            .iter()
            .filter(|(name, _)| is_public(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
    }
    exported
        .iter()
        .filter_map(|name| env.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_public_set_hides_underscore_and_temporaries() {
        let mut env = Env::default();
        env.insert("visible".to_owned(), Value::Int(1));
        env.insert("_hidden".to_owned(), Value::Int(2));
        env.insert("@match0".to_owned(), Value::Int(3));
        let exports = compute_exports(&[], &env).unwrap();
        assert_eq!(exports.len(), 1);
        assert!(exports.contains_key("visible"));
    }

    #[test]
    fn explicit_exports_are_exclusive() {
        let mut env = Env::default();
        env.insert("a".to_owned(), Value::Int(1));
        env.insert("b".to_owned(), Value::Int(2));
        let exports = compute_exports(&["a".to_owned()], &env).unwrap();
        assert_eq!(exports.len(), 1);
        assert!(exports.contains_key("a"));

        let err = compute_exports(&["missing".to_owned()], &env).unwrap_err();
        assert_eq!(err.message, "Exported name 'missing' is not defined");
    }
}
