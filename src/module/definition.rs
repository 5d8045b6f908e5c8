//! Module definitions and the fluent composition builder.

use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::module::inject::Injected;
use crate::module::schema::{
    ActionEntry, ActionSchema, GetterEntry, GetterSchema, ModuleState, MutationEntry,
    MutationSchema,
};
use crate::path::next_module_id;

type StateInit = Arc<dyn Fn() -> Result<Value, StoreError> + Send + Sync>;

pub(crate) struct GettersDef {
    pub deps: Vec<(String, ModuleDefinition)>,
    pub entries: Arc<Vec<GetterEntry>>,
}

pub(crate) struct MutationsDef {
    pub entries: Arc<Vec<MutationEntry>>,
}

pub(crate) struct ActionsDef {
    pub deps: Vec<(String, ModuleDefinition)>,
    pub entries: Arc<Vec<ActionEntry>>,
}

pub(crate) struct ModuleInner {
    pub uid: u64,
    pub state_init: Option<StateInit>,
    pub getters: Option<GettersDef>,
    pub mutations: Option<MutationsDef>,
    pub actions: Option<ActionsDef>,
    pub children: RwLock<BTreeMap<String, ModuleDefinition>>,
    // 0 = unattached, otherwise the id of the store this tree is live in
    pub attached: AtomicU64,
}

/// One node of a module tree: an optional state constructor, optional
/// member schemas for the three capability roles, and named children.
///
/// Definitions are cheap shared handles. A definition carries a
/// process-unique identity and may be live in at most one store at a time;
/// placing it twice in one tree, or registering it into a second store, is
/// a [`StoreError::DuplicateRegistration`].
#[derive(Clone)]
pub struct ModuleDefinition {
    pub(crate) inner: Arc<ModuleInner>,
}

impl ModuleDefinition {
    /// The definition's process-unique identity.
    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    /// Attaches `child` under `key`, rejecting a key already in use.
    ///
    /// The definition is mutated in place and returned for chaining; the
    /// builder composes a tree before the tree is ever handed to a store.
    pub fn child(self, key: impl Into<String>, child: &ModuleDefinition) -> Result<Self, StoreError> {
        let key = key.into();
        {
            let mut children = self.inner.children.write().unwrap();
            if children.contains_key(&key) {
                return Err(StoreError::DuplicateChildKey { key });
            }
            children.insert(key, child.clone());
        }
        Ok(self)
    }

    pub(crate) fn init_state(&self) -> Result<Value, StoreError> {
        match &self.inner.state_init {
            Some(init) => init(),
            None => Ok(Value::Object(serde_json::Map::new())),
        }
    }

    pub(crate) fn children(&self) -> Vec<(String, ModuleDefinition)> {
        self.inner
            .children
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Claims this definition for the given store. Fails if it is already
    /// live somewhere.
    pub(crate) fn attach(&self, store_id: u64) -> bool {
        self.inner
            .attached
            .compare_exchange(0, store_id, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn detach(&self) {
        self.inner.attached.store(0, Ordering::SeqCst);
    }
}

/// Starts building a module whose state slice is `S`.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use stratum::module;
///
/// #[derive(Serialize, Deserialize, Default)]
/// struct CounterState {
///     count: i64,
/// }
///
/// let counter = module::<CounterState>()
///     .state(CounterState::default)
///     .mutations(|m| {
///         m.mutation("inc", |state: &mut CounterState, n: i64| state.count += n);
///     })
///     .finish()
///     .unwrap();
/// assert!(counter.uid() > 0);
/// ```
pub fn module<S: ModuleState>() -> ModuleBuilder<S> {
    ModuleBuilder {
        state_init: None,
        getters: None,
        mutations: None,
        actions: None,
        error: None,
        _state: PhantomData,
    }
}

/// Fluent builder returned by [`module`].
pub struct ModuleBuilder<S> {
    state_init: Option<StateInit>,
    getters: Option<GettersDef>,
    mutations: Option<MutationsDef>,
    actions: Option<ActionsDef>,
    error: Option<StoreError>,
    _state: PhantomData<fn() -> S>,
}

impl<S: ModuleState> ModuleBuilder<S> {
    /// Sets the zero-argument state constructor. Without one the module
    /// contributes an empty object to the state tree.
    pub fn state<F>(mut self, init: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.state_init = Some(Arc::new(move || {
            serde_json::to_value(init()).map_err(|e| StoreError::Serialize {
                path: String::new(),
                reason: e.to_string(),
            })
        }));
        self
    }

    /// Registers the module's getters.
    pub fn getters<F>(self, build: F) -> Self
    where
        F: FnOnce(&mut GetterSchema<S>),
    {
        self.getters_with(Injected::empty(), build)
    }

    /// Registers the module's getters along with injected dependencies,
    /// exposed read-only (state and getters) under their keys.
    pub fn getters_with<F>(mut self, deps: Injected, build: F) -> Self
    where
        F: FnOnce(&mut GetterSchema<S>),
    {
        let mut schema = GetterSchema::new();
        build(&mut schema);
        match schema.finish() {
            Ok(entries) => {
                self.getters = Some(GettersDef {
                    deps: deps.into_deps(),
                    entries: Arc::new(entries),
                });
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Registers the module's mutations.
    ///
    /// There is no `mutations_with`: mutations cannot see other modules,
    /// only their own state slice.
    pub fn mutations<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut MutationSchema<S>),
    {
        let mut schema = MutationSchema::new();
        build(&mut schema);
        match schema.finish() {
            Ok(entries) => {
                self.mutations = Some(MutationsDef {
                    entries: Arc::new(entries),
                });
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Registers the module's actions.
    pub fn actions<F>(self, build: F) -> Self
    where
        F: FnOnce(&mut ActionSchema<S>),
    {
        self.actions_with(Injected::empty(), build)
    }

    /// Registers the module's actions along with injected dependencies,
    /// exposed in full (state, getters, mutations, actions) under their
    /// keys.
    pub fn actions_with<F>(mut self, deps: Injected, build: F) -> Self
    where
        F: FnOnce(&mut ActionSchema<S>),
    {
        let mut schema = ActionSchema::new();
        build(&mut schema);
        match schema.finish() {
            Ok(entries) => {
                self.actions = Some(ActionsDef {
                    deps: deps.into_deps(),
                    entries: Arc::new(entries),
                });
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Produces the definition, surfacing any schema error recorded along
    /// the way.
    pub fn finish(self) -> Result<ModuleDefinition, StoreError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(ModuleDefinition {
            inner: Arc::new(ModuleInner {
                uid: next_module_id(),
                state_init: self.state_init,
                getters: self.getters,
                mutations: self.mutations,
                actions: self.actions,
                children: RwLock::new(BTreeMap::new()),
                attached: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> ModuleDefinition {
        module::<serde_json::Value>().finish().unwrap()
    }

    #[test]
    fn identities_are_unique() {
        let a = leaf();
        let b = leaf();
        assert_ne!(a.uid(), b.uid());
    }

    #[test]
    fn child_keys_must_be_unique() {
        let a = leaf();
        let b = leaf();
        let root = leaf().child("foo", &a).unwrap();
        let err = match root.child("foo", &b) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, StoreError::DuplicateChildKey { key } if key == "foo"));
    }

    #[test]
    fn attach_is_exclusive() {
        let a = leaf();
        assert!(a.attach(1));
        assert!(!a.attach(2));
        a.detach();
        assert!(a.attach(2));
    }
}
