use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreError;
use crate::module::{ActionFuture, GetterKind, IntoArgs, ModuleDefinition, ModuleProxy};
use crate::path::join;
use crate::reactive::engine::{ReactiveEngine, SignalEngine, WatchOptions};
use crate::store::{
    GetterHook, GetterMember, Hooks, MutationHook, MutationMember, StateCell, Store, Subscription,
};

/// A store plugin, invoked once at construction with the assembled store.
/// Plugins consume only the public store surface.
pub type Plugin = Box<dyn Fn(&ReactiveStore) + Send + Sync>;

/// Options for [`create_store`].
#[derive(Default)]
pub struct StoreOptions {
    /// When enabled, any state change observed outside a mutation commit
    /// panics with the illegal-state-mutation message. Best-effort: the
    /// check runs at the engine's next observation opportunity.
    pub strict: bool,
    /// Plugins run once after the store is assembled.
    pub plugins: Vec<Plugin>,
    /// The reactivity engine. Defaults to a fresh [`SignalEngine`].
    pub engine: Option<Arc<dyn ReactiveEngine>>,
}

struct AdapterShared {
    // Mirrors the configured strict flag, toggled off inside mutation
    // commit windows; the state observer reads it to decide legality.
    strict: AtomicBool,
    configured_strict: bool,
}

fn commit_window<R>(shared: &AdapterShared, f: impl FnOnce() -> R) -> R {
    let previous = shared.strict.swap(false, Ordering::SeqCst);
    let result = f();
    shared.strict.store(previous, Ordering::SeqCst);
    result
}

/// State cell backed by the engine's reactive container.
///
/// The hot window suppresses the bare runtime's default-state write during
/// a hot swap, which is how live state values survive while getters,
/// mutations, and actions are rebuilt.
struct ReactiveStateCell {
    cell: Arc<dyn crate::reactive::engine::ReactiveCell>,
    hot: AtomicBool,
}

impl ReactiveStateCell {
    fn touch(&self) {
        self.cell.update(&mut |_| {});
    }
}

impl StateCell for ReactiveStateCell {
    fn snapshot(&self) -> Value {
        self.cell.get()
    }

    fn replace(&self, value: Value) {
        if !self.hot.load(Ordering::SeqCst) {
            self.cell.set(value);
        }
    }

    fn update(&self, f: &mut dyn FnMut(&mut Value)) {
        self.cell.update(f);
    }
}

struct ReactiveInner {
    store: Store,
    engine: Arc<dyn ReactiveEngine>,
    shared: Arc<AdapterShared>,
    cell: Arc<ReactiveStateCell>,
    // Keeps the strict-mode state observer installed for the store's
    // lifetime.
    _strict_watch: Option<Subscription>,
}

/// The reactive store façade: the bare runtime bridged onto a reactivity
/// engine.
///
/// State lives in a reactive container, every derived-value getter becomes
/// a memoized value keyed by its dotted path, `watch` observes
/// `selector(state, getters)`, and hot swapping preserves live state while
/// replacing the member trees. Handles are cheap clones sharing one store.
#[derive(Clone)]
pub struct ReactiveStore {
    inner: Arc<ReactiveInner>,
}

/// Builds a [`ReactiveStore`] from a module definition tree.
pub fn create_store(
    root: &ModuleDefinition,
    options: StoreOptions,
) -> Result<ReactiveStore, StoreError> {
    let StoreOptions {
        strict,
        plugins,
        engine,
    } = options;
    let engine = engine.unwrap_or_else(|| Arc::new(SignalEngine::new()));
    let shared = Arc::new(AdapterShared {
        strict: AtomicBool::new(strict),
        configured_strict: strict,
    });

    let hooks = Hooks {
        getter: Some(getter_hook(engine.clone())),
        mutation: Some(mutation_hook(shared.clone())),
        action: None,
    };
    let store = Store::with_hooks(root, hooks)?;

    let cell = Arc::new(ReactiveStateCell {
        cell: engine.cell(store.state()),
        hot: AtomicBool::new(false),
    });
    store.install_state_cell(cell.clone());

    let strict_watch = if strict {
        let shared = shared.clone();
        let state_source = store.downgrade();
        Some(engine.observe(
            Box::new(move || {
                state_source
                    .upgrade()
                    .map(|core| core.state_snapshot())
                    .unwrap_or(Value::Null)
            }),
            Box::new(move |_new, _old| {
                if shared.strict.load(Ordering::SeqCst) {
                    panic!("{}", StoreError::IllegalStateMutation);
                }
            }),
            WatchOptions::default(),
        ))
    } else {
        None
    };

    let reactive = ReactiveStore {
        inner: Arc::new(ReactiveInner {
            store,
            engine,
            shared,
            cell,
            _strict_watch: strict_watch,
        }),
    };

    for plugin in &plugins {
        plugin(&reactive);
    }

    Ok(reactive)
}

fn getter_hook(engine: Arc<dyn ReactiveEngine>) -> GetterHook {
    Arc::new(move |member: GetterMember, path: &[String]| {
        if member.kind != GetterKind::Getter {
            return member;
        }
        let name = join(path);
        let original = member.run.clone();
        let derived = engine.derived(Box::new(move || match original(&[]) {
            Ok(value) => value,
            // Getters have no error channel inside the reactive graph.
            Err(e) => panic!("getter `{name}` failed: {e}"),
        }));
        GetterMember {
            kind: member.kind,
            run: Arc::new(move |_args| Ok(derived.get())),
        }
    })
}

fn mutation_hook(shared: Arc<AdapterShared>) -> MutationHook {
    Arc::new(move |member: MutationMember, _path: &[String]| {
        let original = member.run.clone();
        let shared = shared.clone();
        MutationMember {
            run: Arc::new(move |args| commit_window(&shared, || original(args))),
        }
    })
}

/// Getter access handed to watch selectors.
pub struct GettersView {
    core: std::sync::Weak<crate::store::StoreCore>,
}

impl GettersView {
    fn eval(&self, path: &[&str], args: Vec<Value>) -> Result<Value, StoreError> {
        let Some(core) = self.core.upgrade() else {
            // the store is gone, so the observer is about to go too
            return Ok(Value::Null);
        };
        let (name, module_path) = path
            .split_last()
            .ok_or_else(|| StoreError::PathNotFound {
                path: String::new(),
            })?;
        let module_path: Vec<String> = module_path.iter().map(|s| s.to_string()).collect();
        core.getter_value(&module_path, name, &args)
    }

    /// Evaluates the getter at `path`, decoded as `T`. Selector failures
    /// are programming errors and panic.
    pub fn get<T: DeserializeOwned>(&self, path: &[&str]) -> T {
        self.call(path, ())
    }

    /// Calls the parametric getter at `path`.
    pub fn call<T: DeserializeOwned>(&self, path: &[&str], args: impl IntoArgs) -> T {
        let value = self.raw_args(path, args);
        serde_json::from_value(value)
            .unwrap_or_else(|e| panic!("watch selector failed at `{}`: {e}", join(path)))
    }

    /// Evaluates the getter at `path` without decoding.
    pub fn raw(&self, path: &[&str]) -> Value {
        self.raw_args(path, ())
    }

    fn raw_args(&self, path: &[&str], args: impl IntoArgs) -> Value {
        args.into_args()
            .and_then(|args| self.eval(path, args))
            .unwrap_or_else(|e| panic!("watch selector failed at `{}`: {e}", join(path)))
    }
}

impl ReactiveStore {
    /// A snapshot of the aggregate state tree. Tracked when read inside an
    /// observer.
    pub fn state(&self) -> Value {
        self.inner.store.state()
    }

    /// Evaluates the getter at `path`.
    pub fn getter<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T, StoreError> {
        self.inner.store.getter(path)
    }

    /// Calls the parametric getter at `path`.
    pub fn call_getter<T: DeserializeOwned>(
        &self,
        path: &[&str],
        args: impl IntoArgs,
    ) -> Result<T, StoreError> {
        self.inner.store.call_getter(path, args)
    }

    /// Commits the mutation at `path`.
    pub fn mutate(&self, path: &[&str], args: impl IntoArgs) -> Result<(), StoreError> {
        self.inner.store.mutate(path, args)
    }

    /// Dispatches the action at `path`.
    pub fn dispatch(
        &self,
        path: &[&str],
        args: impl IntoArgs,
    ) -> Result<Option<ActionFuture>, StoreError> {
        self.inner.store.dispatch(path, args)
    }

    /// Subscribes to every mutation.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&[String], &[Value], &Value) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(subscriber)
    }

    /// Looks up the proxy for a registered definition.
    pub fn get_proxy(&self, definition: &ModuleDefinition) -> Option<ModuleProxy> {
        self.inner.store.get_proxy(definition)
    }

    /// Replaces the entire state tree. Privileged even under strict mode:
    /// this is a bulk administrative operation, not a mutation.
    pub fn replace_state(&self, state: Value) {
        commit_window(&self.inner.shared, || {
            self.inner.store.replace_state(state);
        });
    }

    /// Whether strict mode was configured for this store.
    pub fn is_strict(&self) -> bool {
        self.inner.shared.configured_strict
    }

    /// Observes `selector(state, getters)`, invoking `callback(new, old)`
    /// whenever the selected value changes.
    pub fn watch<S, C>(&self, selector: S, callback: C, options: WatchOptions) -> Subscription
    where
        S: Fn(&Value, &GettersView) -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let weak = self.inner.store.downgrade();
        let view = GettersView {
            core: self.inner.store.downgrade(),
        };
        self.inner.engine.observe(
            Box::new(move || {
                // Reading state here subscribes every watcher to state
                // changes, including the post-hot-swap wakeup.
                let state = weak
                    .upgrade()
                    .map(|core| core.state_snapshot())
                    .unwrap_or(Value::Null);
                selector(&state, &view)
            }),
            Box::new(callback),
            options,
        )
    }

    /// Replaces the whole module tree, preserving live state values.
    ///
    /// The old getter tree is discarded along with its memoized values and
    /// rebuilt during re-registration; afterwards the state container is
    /// nudged so existing watchers re-evaluate against the new getter
    /// tree. External holders of getter paths and proxies keep working
    /// because resolution is by path.
    pub fn hot_update(&self, root: &ModuleDefinition) -> Result<(), StoreError> {
        debug!("hot updating reactive store");
        self.inner.cell.hot.store(true, Ordering::SeqCst);
        let result = self.inner.store.hot_update(root);
        self.inner.cell.hot.store(false, Ordering::SeqCst);
        result?;
        commit_window(&self.inner.shared, || self.inner.cell.touch());
        Ok(())
    }

    /// A flattened view of every derived-value getter, keyed by dot-joined
    /// path.
    pub fn flatten_getters(&self) -> BTreeMap<String, Value> {
        self.inner.store.flatten_getters()
    }

    /// A handle that does not keep the store alive. Used by collaborators
    /// the store itself holds on to, like the devtool bridge.
    pub fn downgrade(&self) -> WeakReactiveStore {
        WeakReactiveStore {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`ReactiveStore`].
#[derive(Clone)]
pub struct WeakReactiveStore {
    inner: std::sync::Weak<ReactiveInner>,
}

impl WeakReactiveStore {
    /// The store, if it is still alive.
    pub fn upgrade(&self) -> Option<ReactiveStore> {
        self.inner.upgrade().map(|inner| ReactiveStore { inner })
    }
}
