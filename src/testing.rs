//! Stub facility for unit-testing capability members without a store.
//!
//! [`stub`] builds a standalone instance of a module's members with
//! explicitly injected state, canned getter values, fully canned dependency
//! modules, and optional recording of mutation and action calls, bypassing
//! store and proxy wiring entirely.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::StoreError;
use crate::module::{
    ActionEntry, ActionFuture, ActionReturn, GetterEntry, IntoArgs, ModuleDefinition,
    MutationEntry, ScopeCore,
};

/// What kind of member a recorded call hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Mutation,
    Action,
}

/// One recorded mutation or action call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// `None` for the stubbed module's own members, otherwise the
    /// dependency key the call went to.
    pub module: Option<String>,
    pub kind: CallKind,
    pub name: String,
    pub args: Vec<Value>,
}

struct StubEntries {
    getters: Option<Arc<Vec<GetterEntry>>>,
    mutations: Option<Arc<Vec<MutationEntry>>>,
    actions: Option<Arc<Vec<ActionEntry>>>,
}

/// Backing data for a stubbed capability scope.
pub(crate) struct StubData {
    label: Option<String>,
    state: RwLock<Value>,
    getter_overrides: BTreeMap<String, Value>,
    // `None` for canned dependency modules: every call is recorded.
    entries: Option<StubEntries>,
    record_mutations: bool,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    modules: BTreeMap<String, Arc<StubData>>,
}

impl StubData {
    pub(crate) fn state(&self) -> Value {
        self.state.read().unwrap().clone()
    }

    pub(crate) fn getter_raw(
        data: &Arc<StubData>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, StoreError> {
        if let Some(value) = data.getter_overrides.get(name) {
            return Ok(value.clone());
        }
        let entries = data
            .entries
            .as_ref()
            .and_then(|e| e.getters.as_ref())
            .ok_or_else(|| StoreError::MemberNotFound {
                path: name.to_string(),
            })?;
        let entry = entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StoreError::MemberNotFound {
                path: name.to_string(),
            })?;
        (entry.run)(&ScopeCore::Stub(data.clone()), args)
    }

    pub(crate) fn commit(
        data: &Arc<StubData>,
        name: &str,
        args: &[Value],
    ) -> Result<(), StoreError> {
        let entries = data.entries.as_ref().and_then(|e| e.mutations.as_ref());
        if data.record_mutations || entries.is_none() {
            data.calls.lock().unwrap().push(RecordedCall {
                module: data.label.clone(),
                kind: CallKind::Mutation,
                name: name.to_string(),
                args: args.to_vec(),
            });
            return Ok(());
        }
        let entries = entries.ok_or_else(|| StoreError::MemberNotFound {
            path: name.to_string(),
        })?;
        let entry = entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StoreError::MemberNotFound {
                path: name.to_string(),
            })?;
        let mut state = data.state.write().unwrap();
        match (entry.run)(&mut state, args)? {
            Some(_) => Err(StoreError::MutationsMustNotReturn {
                path: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn dispatch(
        data: &Arc<StubData>,
        name: &str,
        args: &[Value],
    ) -> Result<Option<ActionFuture>, StoreError> {
        let entries = data.entries.as_ref().and_then(|e| e.actions.as_ref());
        let Some(entries) = entries else {
            data.calls.lock().unwrap().push(RecordedCall {
                module: data.label.clone(),
                kind: CallKind::Action,
                name: name.to_string(),
                args: args.to_vec(),
            });
            return Ok(None);
        };
        let entry = entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StoreError::MemberNotFound {
                path: name.to_string(),
            })?;
        let core = Arc::new(ScopeCore::Stub(data.clone()));
        match (entry.run)(&core, args)? {
            ActionReturn::Done => Ok(None),
            ActionReturn::Pending(future) => Ok(Some(future)),
            ActionReturn::Value(value) if value.is_null() => Ok(None),
            ActionReturn::Value(_) => Err(StoreError::ActionsInvalidReturn {
                path: name.to_string(),
            }),
        }
    }

    pub(crate) fn module(&self, key: &str) -> Option<Arc<StubData>> {
        self.modules.get(key).cloned()
    }
}

/// A canned dependency module: injected state and getter values only;
/// every mutation and action call against it is recorded.
pub struct StubModule {
    state: Value,
    getters: BTreeMap<String, Value>,
    error: Option<StoreError>,
}

impl StubModule {
    pub fn new() -> Self {
        Self {
            state: Value::Object(serde_json::Map::new()),
            getters: BTreeMap::new(),
            error: None,
        }
    }

    /// Injects the dependency's state slice.
    pub fn state<T: Serialize>(mut self, state: T) -> Self {
        match serde_json::to_value(state) {
            Ok(value) => self.state = value,
            Err(e) => {
                self.error.get_or_insert(StoreError::Serialize {
                    path: String::new(),
                    reason: e.to_string(),
                });
            }
        }
        self
    }

    /// Injects a canned getter value.
    pub fn getter<T: Serialize>(mut self, name: &str, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.getters.insert(name.to_string(), value);
            }
            Err(e) => {
                self.error.get_or_insert(StoreError::Serialize {
                    path: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        self
    }
}

impl Default for StubModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts stubbing `definition`'s members.
pub fn stub(definition: &ModuleDefinition) -> StubBuilder {
    StubBuilder {
        definition: definition.clone(),
        state: None,
        getters: BTreeMap::new(),
        modules: BTreeMap::new(),
        record_mutations: false,
        error: None,
    }
}

/// Builder returned by [`stub`].
pub struct StubBuilder {
    definition: ModuleDefinition,
    state: Option<Value>,
    getters: BTreeMap<String, Value>,
    modules: BTreeMap<String, StubModule>,
    record_mutations: bool,
    error: Option<StoreError>,
}

impl StubBuilder {
    /// Injects the module's state slice.
    pub fn state<T: Serialize>(mut self, state: T) -> Self {
        match serde_json::to_value(state) {
            Ok(value) => self.state = Some(value),
            Err(e) => {
                self.error.get_or_insert(StoreError::Serialize {
                    path: String::new(),
                    reason: e.to_string(),
                });
            }
        }
        self
    }

    /// Overrides one of the module's own getters with a canned value.
    pub fn getter<T: Serialize>(mut self, name: &str, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.getters.insert(name.to_string(), value);
            }
            Err(e) => {
                self.error.get_or_insert(StoreError::Serialize {
                    path: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        self
    }

    /// Injects a canned dependency module under `key`.
    pub fn module(mut self, key: &str, module: StubModule) -> Self {
        self.modules.insert(key.to_string(), module);
        self
    }

    /// Records the module's own mutation calls instead of executing them.
    pub fn record_mutations(mut self) -> Self {
        self.record_mutations = true;
        self
    }

    /// Builds the stub instance.
    pub fn build(self) -> Result<StubInstance, StoreError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut modules = BTreeMap::new();
        for (key, module) in self.modules {
            if let Some(e) = module.error {
                return Err(e);
            }
            modules.insert(
                key.clone(),
                Arc::new(StubData {
                    label: Some(key),
                    state: RwLock::new(module.state),
                    getter_overrides: module.getters,
                    entries: None,
                    record_mutations: true,
                    calls: calls.clone(),
                    modules: BTreeMap::new(),
                }),
            );
        }

        let inner = &self.definition.inner;
        let entries = StubEntries {
            getters: inner.getters.as_ref().map(|g| g.entries.clone()),
            mutations: inner.mutations.as_ref().map(|m| m.entries.clone()),
            actions: inner.actions.as_ref().map(|a| a.entries.clone()),
        };

        Ok(StubInstance {
            data: Arc::new(StubData {
                label: None,
                state: RwLock::new(
                    self.state
                        .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
                ),
                getter_overrides: self.getters,
                entries: Some(entries),
                record_mutations: self.record_mutations,
                calls,
                modules,
            }),
        })
    }
}

/// A standalone instance of a module's members.
pub struct StubInstance {
    data: Arc<StubData>,
}

impl StubInstance {
    /// The stub's current state slice.
    pub fn state(&self) -> Value {
        self.data.state()
    }

    /// Evaluates one of the module's getters.
    pub fn getter<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let value = StubData::getter_raw(&self.data, name, &[])?;
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Calls one of the module's parametric getters.
    pub fn call_getter<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<T, StoreError> {
        let args = args.into_args()?;
        let value = StubData::getter_raw(&self.data, name, &args)?;
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Runs one of the module's mutations against the injected state (or
    /// records it when [`StubBuilder::record_mutations`] is set).
    pub fn mutate(&self, name: &str, args: impl IntoArgs) -> Result<(), StoreError> {
        let args = args.into_args()?;
        StubData::commit(&self.data, name, &args)
    }

    /// Runs one of the module's actions against the stub scope.
    pub fn dispatch(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<Option<ActionFuture>, StoreError> {
        let args = args.into_args()?;
        StubData::dispatch(&self.data, name, &args)
    }

    /// Every recorded mutation and action call, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.data.calls.lock().unwrap().clone()
    }
}
