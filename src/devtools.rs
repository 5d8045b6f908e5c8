//! Debug/inspection bridge.
//!
//! An external devtool mirrors the store by consuming the public surface
//! only: an initial snapshot, one record per mutation (dot-joined path,
//! payload, resulting state), and a handle whose `travel_to` drives
//! time-travel through `replace_state`.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::path::join;
use crate::reactive::{Plugin, ReactiveStore, WeakReactiveStore};

/// One mirrored mutation.
#[derive(Clone, Debug)]
pub struct MutationRecord {
    /// Dot-joined mutation path, e.g. `counter.inc`.
    pub kind: String,
    /// The mutation's argument list.
    pub payload: Vec<Value>,
    /// The state tree after the mutation.
    pub state: Value,
}

/// Store handle given to a connected bridge.
///
/// Holds the store weakly: a bridge kept alive by the store's own
/// subscriber list must not keep the store alive in turn. Every method is
/// a no-op once the store is gone.
#[derive(Clone)]
pub struct DevtoolHandle {
    store: WeakReactiveStore,
}

impl DevtoolHandle {
    fn store(&self) -> Option<ReactiveStore> {
        self.store.upgrade()
    }

    /// Replaces the whole state tree (time travel).
    pub fn travel_to(&self, state: Value) {
        if let Some(store) = self.store() {
            store.replace_state(state);
        }
    }

    /// The current state tree.
    pub fn state(&self) -> Value {
        self.store()
            .map(|store| store.state())
            .unwrap_or(Value::Null)
    }

    /// Every derived-value getter, keyed by dot-joined path.
    pub fn getters(&self) -> BTreeMap<String, Value> {
        self.store()
            .map(|store| store.flatten_getters())
            .unwrap_or_default()
    }
}

/// An external debugging tool.
pub trait DevtoolBridge: Send + Sync + 'static {
    /// Called once with a handle the bridge may keep for time travel.
    fn connected(&self, handle: DevtoolHandle) {
        let _ = handle;
    }

    /// Called once with the initial state and flattened getters.
    fn init(&self, state: Value, getters: BTreeMap<String, Value>);

    /// Called for every committed mutation.
    fn mutation(&self, record: MutationRecord);
}

/// Builds a plugin that mirrors the store into `bridge`.
pub fn devtool_plugin(bridge: Arc<dyn DevtoolBridge>) -> Plugin {
    Box::new(move |store: &ReactiveStore| {
        debug!("devtool bridge connected");
        bridge.connected(DevtoolHandle {
            store: store.downgrade(),
        });
        bridge.init(store.state(), store.flatten_getters());

        let bridge = bridge.clone();
        store
            .subscribe(move |path, args, state| {
                bridge.mutation(MutationRecord {
                    kind: join(path),
                    payload: args.to_vec(),
                    state: state.clone(),
                });
            })
            .detach();
    })
}
