//! Execution scopes for capability members.
//!
//! Every member closure runs against a scope backed by either a live
//! [`ModuleProxy`] (resolved by path on every access, which is what keeps
//! hot-swapped trees transparent) or stub data injected by the testing
//! facility.
//!
//! Getter scopes expose an infallible surface: a getter is a pure derived
//! computation with no error channel, so contract violations (state shape
//! drift, unknown member names) panic the way a thrown exception would.
//! Action scopes return `Result` wherever a caller can meaningfully handle
//! the failure.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::StoreError;
use crate::module::proxy::ModuleProxy;
use crate::module::schema::{ActionFuture, IntoArgs, ModuleState};
use crate::testing::StubData;

/// Backing for a capability scope: a live store proxy or injected stub data.
#[derive(Clone)]
pub(crate) enum ScopeCore {
    Live {
        proxy: ModuleProxy,
        modules: Arc<BTreeMap<String, ModuleProxy>>,
    },
    Stub(Arc<StubData>),
}

impl ScopeCore {
    pub(crate) fn live(proxy: ModuleProxy, modules: BTreeMap<String, ModuleProxy>) -> Self {
        ScopeCore::Live {
            proxy,
            modules: Arc::new(modules),
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> T {
    serde_json::from_value(value)
        .unwrap_or_else(|e| panic!("{what} does not match the expected type: {e}"))
}

/// Scope handed to getter closures: typed state, sibling getters, and
/// read-only handles to injected modules.
pub struct GetterScope<S> {
    core: ScopeCore,
    _state: PhantomData<fn() -> S>,
}

impl<S: ModuleState> GetterScope<S> {
    pub(crate) fn new(core: ScopeCore) -> Self {
        Self {
            core,
            _state: PhantomData,
        }
    }

    /// The module's current state slice.
    pub fn state(&self) -> S {
        let value = match &self.core {
            ScopeCore::Live { proxy, .. } => proxy
                .state()
                .unwrap_or_else(|e| panic!("cannot read module state: {e}")),
            ScopeCore::Stub(data) => data.state(),
        };
        decode(value, "module state")
    }

    fn raw(&self, name: &str, args: &[Value]) -> Result<Value, StoreError> {
        match &self.core {
            ScopeCore::Live { proxy, .. } => proxy.getter_raw(name, args),
            ScopeCore::Stub(data) => StubData::getter_raw(data, name, args),
        }
    }

    /// Reads a sibling getter, so getters can build on each other.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> T {
        let value = self
            .raw(name, &[])
            .unwrap_or_else(|e| panic!("getter `{name}` failed: {e}"));
        decode(value, "getter value")
    }

    /// Calls a sibling parametric getter.
    pub fn call<T: DeserializeOwned>(&self, name: &str, args: impl IntoArgs) -> T {
        let args = args
            .into_args()
            .unwrap_or_else(|e| panic!("getter `{name}` arguments failed to serialize: {e}"));
        let value = self
            .raw(name, &args)
            .unwrap_or_else(|e| panic!("getter `{name}` failed: {e}"));
        decode(value, "getter value")
    }

    /// A read-only view of an injected module.
    pub fn module(&self, key: &str) -> ModuleView {
        match &self.core {
            ScopeCore::Live { modules, .. } => match modules.get(key) {
                Some(proxy) => ModuleView {
                    target: ViewTarget::Live(proxy.clone()),
                },
                None => panic!("{}", StoreError::DependencyNotFound { key: key.into() }),
            },
            ScopeCore::Stub(data) => match data.module(key) {
                Some(dep) => ModuleView {
                    target: ViewTarget::Stub(dep),
                },
                None => panic!("{}", StoreError::DependencyNotFound { key: key.into() }),
            },
        }
    }
}

enum ViewTarget {
    Live(ModuleProxy),
    Stub(Arc<StubData>),
}

/// Read-only handle to an injected module: state and getters only.
pub struct ModuleView {
    target: ViewTarget,
}

impl ModuleView {
    /// The dependency's raw state slice.
    pub fn state_value(&self) -> Value {
        match &self.target {
            ViewTarget::Live(proxy) => proxy
                .state()
                .unwrap_or_else(|e| panic!("cannot read dependency state: {e}")),
            ViewTarget::Stub(data) => data.state(),
        }
    }

    /// The dependency's state slice, decoded as `T`.
    pub fn state<T: DeserializeOwned>(&self) -> T {
        decode(self.state_value(), "dependency state")
    }

    /// Reads one of the dependency's getters.
    pub fn getter<T: DeserializeOwned>(&self, name: &str) -> T {
        let value = match &self.target {
            ViewTarget::Live(proxy) => proxy.getter_raw(name, &[]),
            ViewTarget::Stub(data) => StubData::getter_raw(data, name, &[]),
        }
        .unwrap_or_else(|e| panic!("dependency getter `{name}` failed: {e}"));
        decode(value, "dependency getter value")
    }
}

/// Scope handed to action closures: typed state, own getters and mutations,
/// sibling actions, and full handles to injected modules.
pub struct ActionScope<S> {
    core: Arc<ScopeCore>,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for ActionScope<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _state: PhantomData,
        }
    }
}

impl<S: ModuleState> ActionScope<S> {
    pub(crate) fn new(core: Arc<ScopeCore>) -> Self {
        Self {
            core,
            _state: PhantomData,
        }
    }

    /// The module's current state slice.
    pub fn state(&self) -> S {
        let value = match &*self.core {
            ScopeCore::Live { proxy, .. } => proxy
                .state()
                .unwrap_or_else(|e| panic!("cannot read module state: {e}")),
            ScopeCore::Stub(data) => data.state(),
        };
        decode(value, "module state")
    }

    /// Reads one of the module's own getters.
    pub fn getter<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let value = match &*self.core {
            ScopeCore::Live { proxy, .. } => proxy.getter_raw(name, &[])?,
            ScopeCore::Stub(data) => StubData::getter_raw(data, name, &[])?,
        };
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Calls one of the module's own parametric getters.
    pub fn call_getter<T: DeserializeOwned>(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<T, StoreError> {
        let args = args.into_args()?;
        let value = match &*self.core {
            ScopeCore::Live { proxy, .. } => proxy.getter_raw(name, &args)?,
            ScopeCore::Stub(data) => StubData::getter_raw(data, name, &args)?,
        };
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Commits one of the module's own mutations, with subscriber
    /// notification as usual.
    pub fn commit(&self, name: &str, args: impl IntoArgs) -> Result<(), StoreError> {
        let args = args.into_args()?;
        match &*self.core {
            ScopeCore::Live { proxy, .. } => proxy.mutate(name, args),
            ScopeCore::Stub(data) => StubData::commit(data, name, &args),
        }
    }

    /// Dispatches a sibling action.
    pub fn dispatch(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<Option<ActionFuture>, StoreError> {
        let args = args.into_args()?;
        match &*self.core {
            ScopeCore::Live { proxy, .. } => proxy.dispatch(name, args),
            ScopeCore::Stub(data) => StubData::dispatch(data, name, &args),
        }
    }

    /// A full handle to an injected module.
    pub fn module(&self, key: &str) -> Result<ModuleHandle, StoreError> {
        match &*self.core {
            ScopeCore::Live { modules, .. } => modules
                .get(key)
                .map(|proxy| ModuleHandle {
                    target: HandleTarget::Live(proxy.clone()),
                })
                .ok_or_else(|| StoreError::DependencyNotFound { key: key.into() }),
            ScopeCore::Stub(data) => data
                .module(key)
                .map(|dep| ModuleHandle {
                    target: HandleTarget::Stub(dep),
                })
                .ok_or_else(|| StoreError::DependencyNotFound { key: key.into() }),
        }
    }
}

enum HandleTarget {
    Live(ModuleProxy),
    Stub(Arc<StubData>),
}

/// Full handle to an injected module: state, getters, mutations, actions.
pub struct ModuleHandle {
    target: HandleTarget,
}

impl ModuleHandle {
    /// The dependency's raw state slice.
    pub fn state_value(&self) -> Result<Value, StoreError> {
        match &self.target {
            HandleTarget::Live(proxy) => proxy.state(),
            HandleTarget::Stub(data) => Ok(data.state()),
        }
    }

    /// The dependency's state slice, decoded as `T`.
    pub fn state<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let value = self.state_value()?;
        serde_json::from_value(value).map_err(|e| StoreError::StateShapeMismatch {
            path: String::new(),
            reason: e.to_string(),
        })
    }

    /// Reads one of the dependency's getters.
    pub fn getter<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let value = match &self.target {
            HandleTarget::Live(proxy) => proxy.getter_raw(name, &[])?,
            HandleTarget::Stub(data) => StubData::getter_raw(data, name, &[])?,
        };
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Commits one of the dependency's mutations.
    pub fn commit(&self, name: &str, args: impl IntoArgs) -> Result<(), StoreError> {
        let args = args.into_args()?;
        match &self.target {
            HandleTarget::Live(proxy) => proxy.mutate(name, args),
            HandleTarget::Stub(data) => StubData::commit(data, name, &args),
        }
    }

    /// Dispatches one of the dependency's actions.
    pub fn dispatch(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<Option<ActionFuture>, StoreError> {
        let args = args.into_args()?;
        match &self.target {
            HandleTarget::Live(proxy) => proxy.dispatch(name, args),
            HandleTarget::Stub(data) => StubData::dispatch(data, name, &args),
        }
    }
}
