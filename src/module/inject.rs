//! Cross-module dependency injection.

use crate::module::definition::ModuleDefinition;

/// An ordered list of module dependencies, built with [`inject`] and
/// [`Injected::and`], then attached to a getters or actions schema via the
/// `_with` builder variants.
///
/// Declaring a dependency means: "this module requires that module to be
/// registered somewhere in the same store, wherever it lives in the tree."
/// Dependencies resolve to proxies lazily, by path, so mutually dependent
/// modules are fine — there is no initialization ordering to get wrong.
#[derive(Clone)]
pub struct Injected {
    deps: Vec<(String, ModuleDefinition)>,
}

impl Injected {
    pub(crate) fn empty() -> Self {
        Self { deps: Vec::new() }
    }

    /// Adds another dependency under `key`.
    pub fn and(mut self, key: impl Into<String>, module: &ModuleDefinition) -> Self {
        self.deps.push((key.into(), module.clone()));
        self
    }

    pub(crate) fn into_deps(self) -> Vec<(String, ModuleDefinition)> {
        self.deps
    }
}

/// Starts a dependency list with one module under `key`.
pub fn inject(key: impl Into<String>, module: &ModuleDefinition) -> Injected {
    Injected::empty().and(key, module)
}
