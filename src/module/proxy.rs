//! Path-resolving module proxies.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Weak};

use crate::error::StoreError;
use crate::module::schema::{ActionFuture, IntoArgs};
use crate::store::StoreCore;

/// A live handle to one registered module.
///
/// A proxy never caches anything: every access resolves the module's path
/// against the store's current aggregate trees. That is the whole hot-swap
/// story — a proxy captured before a swap keeps resolving correctly against
/// the replacement tree, because resolution is by path, not by reference.
#[derive(Clone)]
pub struct ModuleProxy {
    path: Arc<Vec<String>>,
    store: Weak<StoreCore>,
}

impl ModuleProxy {
    pub(crate) fn new(path: Vec<String>, store: Weak<StoreCore>) -> Self {
        Self {
            path: Arc::new(path),
            store,
        }
    }

    /// The module's path from the store root.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    fn core(&self) -> Result<Arc<StoreCore>, StoreError> {
        self.store.upgrade().ok_or(StoreError::StoreDetached)
    }

    /// The module's current state slice.
    pub fn state(&self) -> Result<Value, StoreError> {
        self.core()?.subtree(&self.path)
    }

    /// The module's state slice, decoded as `T`.
    pub fn state_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let value = self.state()?;
        serde_json::from_value(value).map_err(|e| StoreError::StateShapeMismatch {
            path: crate::path::join(&self.path),
            reason: e.to_string(),
        })
    }

    /// Evaluates one of the module's getters, raw.
    pub fn getter_raw(&self, name: &str, args: &[Value]) -> Result<Value, StoreError> {
        self.core()?.getter_value(&self.path, name, args)
    }

    /// Evaluates one of the module's getters, decoded as `T`.
    pub fn getter<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let value = self.getter_raw(name, &[])?;
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Calls one of the module's parametric getters.
    pub fn call_getter<T: DeserializeOwned>(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<T, StoreError> {
        let args = args.into_args()?;
        let value = self.getter_raw(name, &args)?;
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Commits one of the module's mutations.
    pub fn mutate(&self, name: &str, args: impl IntoArgs) -> Result<(), StoreError> {
        let args = args.into_args()?;
        self.core()?.mutate_at(&self.path, name, &args)
    }

    /// Dispatches one of the module's actions.
    pub fn dispatch(
        &self,
        name: &str,
        args: impl IntoArgs,
    ) -> Result<Option<ActionFuture>, StoreError> {
        let args = args.into_args()?;
        self.core()?.dispatch_at(&self.path, name, &args)
    }
}
