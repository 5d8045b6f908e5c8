use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, trace, warn};

use crate::error::StoreError;
use crate::module::{
    ActionFuture, ActionReturn, GetterKind, IntoArgs, ModuleDefinition, ModuleProxy, ScopeCore,
};
use crate::path::{get_by_path, get_by_path_mut, join, next_store_id};

/// A mutation subscriber: `(mutation path, argument list, resulting state)`.
pub type SubscriberFn = dyn Fn(&[String], &[Value], &Value) + Send + Sync;

type SubscriberList = Arc<RwLock<Vec<(u64, Arc<SubscriberFn>)>>>;

/// One member of the aggregate getter tree, after binding and hooks.
#[derive(Clone)]
pub(crate) struct GetterMember {
    pub kind: GetterKind,
    pub run: Arc<dyn Fn(&[Value]) -> Result<Value, StoreError> + Send + Sync>,
}

#[derive(Clone)]
pub(crate) struct MutationMember {
    pub run: Arc<dyn Fn(&[Value]) -> Result<(), StoreError> + Send + Sync>,
}

#[derive(Clone)]
pub(crate) struct ActionMember {
    pub run: Arc<dyn Fn(&[Value]) -> Result<Option<ActionFuture>, StoreError> + Send + Sync>,
}

/// A member tree congruent with the module tree: members at this node,
/// child trees under their module keys.
pub(crate) struct Tree<M> {
    pub members: BTreeMap<String, M>,
    pub children: BTreeMap<String, Tree<M>>,
}

impl<M> Default for Tree<M> {
    fn default() -> Self {
        Self {
            members: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

impl<M> Tree<M> {
    fn node_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&Tree<M>> {
        path.iter()
            .try_fold(self, |node, key| node.children.get(key.as_ref()))
    }
}

pub(crate) type GetterTree = Tree<GetterMember>;
pub(crate) type MutationTree = Tree<MutationMember>;
pub(crate) type ActionTree = Tree<ActionMember>;

/// Member transform hooks, keyed by the member's accumulated path. The
/// reactive adapter uses these to memoize getters and to wrap mutations in
/// the strict-mode commit window.
pub(crate) type GetterHook = Arc<dyn Fn(GetterMember, &[String]) -> GetterMember + Send + Sync>;
pub(crate) type MutationHook =
    Arc<dyn Fn(MutationMember, &[String]) -> MutationMember + Send + Sync>;
pub(crate) type ActionHook = Arc<dyn Fn(ActionMember, &[String]) -> ActionMember + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub getter: Option<GetterHook>,
    pub mutation: Option<MutationHook>,
    pub action: Option<ActionHook>,
}

/// Where the aggregate state tree actually lives. The bare store uses a
/// plain slot; the reactive adapter installs a cell backed by its reactive
/// container so every read and write goes through the host engine.
pub(crate) trait StateCell: Send + Sync {
    fn snapshot(&self) -> Value;
    fn replace(&self, value: Value);
    fn update(&self, f: &mut dyn FnMut(&mut Value));
}

struct PlainCell {
    value: RwLock<Value>,
}

impl PlainCell {
    fn new() -> Self {
        Self {
            value: RwLock::new(Value::Null),
        }
    }
}

impl StateCell for PlainCell {
    fn snapshot(&self) -> Value {
        self.value.read().unwrap().clone()
    }

    fn replace(&self, value: Value) {
        *self.value.write().unwrap() = value;
    }

    fn update(&self, f: &mut dyn FnMut(&mut Value)) {
        let mut value = self.value.write().unwrap();
        f(&mut value);
    }
}

pub(crate) struct ModuleRecord {
    pub path: Vec<String>,
    pub definition: ModuleDefinition,
    pub proxy: ModuleProxy,
}

pub(crate) struct StoreCore {
    id: u64,
    state: RwLock<Arc<dyn StateCell>>,
    getters: RwLock<Arc<GetterTree>>,
    mutations: RwLock<Arc<MutationTree>>,
    actions: RwLock<Arc<ActionTree>>,
    module_map: RwLock<BTreeMap<u64, ModuleRecord>>,
    subscribers: SubscriberList,
    next_subscriber: AtomicU64,
    hooks: Hooks,
}

impl StoreCore {
    pub(crate) fn state_snapshot(&self) -> Value {
        self.state.read().unwrap().snapshot()
    }

    pub(crate) fn subtree(&self, path: &[String]) -> Result<Value, StoreError> {
        let snapshot = self.state_snapshot();
        get_by_path(&snapshot, path)
            .cloned()
            .ok_or_else(|| StoreError::PathNotFound { path: join(path) })
    }

    fn proxy_for(&self, definition: &ModuleDefinition) -> Option<ModuleProxy> {
        self.module_map
            .read()
            .unwrap()
            .get(&definition.uid())
            .map(|record| record.proxy.clone())
    }

    pub(crate) fn getter_value(
        &self,
        module_path: &[String],
        name: &str,
        args: &[Value],
    ) -> Result<Value, StoreError> {
        let member = {
            let tree = self.getters.read().unwrap().clone();
            let node = tree
                .node_at(module_path)
                .ok_or_else(|| StoreError::PathNotFound {
                    path: join(module_path),
                })?;
            node.members
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::MemberNotFound {
                    path: join(&member_path(module_path, name)),
                })?
        };
        (member.run)(args)
    }

    pub(crate) fn mutate_at(
        &self,
        module_path: &[String],
        name: &str,
        args: &[Value],
    ) -> Result<(), StoreError> {
        let member = {
            let tree = self.mutations.read().unwrap().clone();
            let node = tree
                .node_at(module_path)
                .ok_or_else(|| StoreError::PathNotFound {
                    path: join(module_path),
                })?;
            node.members
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::MemberNotFound {
                    path: join(&member_path(module_path, name)),
                })?
        };
        (member.run)(args)
    }

    pub(crate) fn dispatch_at(
        &self,
        module_path: &[String],
        name: &str,
        args: &[Value],
    ) -> Result<Option<ActionFuture>, StoreError> {
        let member = {
            let tree = self.actions.read().unwrap().clone();
            let node = tree
                .node_at(module_path)
                .ok_or_else(|| StoreError::PathNotFound {
                    path: join(module_path),
                })?;
            node.members
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::MemberNotFound {
                    path: join(&member_path(module_path, name)),
                })?
        };
        (member.run)(args)
    }

    fn notify(&self, path: &[String], args: &[Value]) {
        let subscribers: Vec<Arc<SubscriberFn>> = self
            .subscribers
            .read()
            .unwrap()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        let state = self.state_snapshot();
        trace!(
            mutation = %join(path),
            subscribers = subscribers.len(),
            "mutation committed"
        );
        for subscriber in subscribers {
            subscriber(path, args, &state);
        }
    }
}

impl Drop for StoreCore {
    fn drop(&mut self) {
        if let Ok(map) = self.module_map.read() {
            for record in map.values() {
                record.definition.detach();
            }
        }
    }
}

/// The bare store runtime.
///
/// Walks a module definition tree, assigns every module a proxy, builds
/// the four congruent aggregate trees, and wires every mutation call
/// through subscriber notification. Handles are cheap clones sharing one
/// store.
///
/// Most applications want [`create_store`](crate::reactive::create_store),
/// which layers reactivity, getter memoization, and strict mode on top.
#[derive(Clone)]
pub struct Store {
    core: Arc<StoreCore>,
}

impl Store {
    /// Builds a store from a module definition tree.
    pub fn new(root: &ModuleDefinition) -> Result<Self, StoreError> {
        Self::with_hooks(root, Hooks::default())
    }

    pub(crate) fn with_hooks(root: &ModuleDefinition, hooks: Hooks) -> Result<Self, StoreError> {
        let core = Arc::new(StoreCore {
            id: next_store_id(),
            state: RwLock::new(Arc::new(PlainCell::new()) as Arc<dyn StateCell>),
            getters: RwLock::new(Arc::new(GetterTree::default())),
            mutations: RwLock::new(Arc::new(MutationTree::default())),
            actions: RwLock::new(Arc::new(ActionTree::default())),
            module_map: RwLock::new(BTreeMap::new()),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscriber: AtomicU64::new(0),
            hooks,
        });
        register(&core, root)?;
        Ok(Store { core })
    }

    /// A snapshot of the aggregate state tree.
    pub fn state(&self) -> Value {
        self.core.state_snapshot()
    }

    /// Replaces the entire state tree. A bulk administrative operation,
    /// not a mutation: subscribers are not notified.
    pub fn replace_state(&self, state: Value) {
        self.core.state.read().unwrap().replace(state);
    }

    /// Subscribes to every mutation. The subscriber sees the mutation's
    /// path, its argument list, and the resulting state, synchronously and
    /// in subscription order, before the mutation call returns.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&[String], &[Value], &Value) + Send + Sync + 'static,
    {
        let id = self
            .core
            .next_subscriber
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.core
            .subscribers
            .write()
            .unwrap()
            .push((id, Arc::new(subscriber)));
        Subscription {
            kind: SubscriptionKind::Mutation {
                id,
                list: Arc::downgrade(&self.core.subscribers),
            },
            active: true,
        }
    }

    /// Evaluates the getter at `path` (module keys, then the member name).
    pub fn getter<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T, StoreError> {
        self.call_getter(path, ())
    }

    /// Calls the parametric getter at `path`.
    pub fn call_getter<T: DeserializeOwned>(
        &self,
        path: &[&str],
        args: impl IntoArgs,
    ) -> Result<T, StoreError> {
        let value = self.raw_getter(path, args)?;
        serde_json::from_value(value).map_err(|e| StoreError::Serialize {
            path: join(path),
            reason: e.to_string(),
        })
    }

    /// Evaluates the getter at `path` without decoding the result.
    pub fn raw_getter(&self, path: &[&str], args: impl IntoArgs) -> Result<Value, StoreError> {
        let args = args.into_args().map_err(|e| e.located(&join(path)))?;
        let (module_path, name) = split_path(path)?;
        self.core.getter_value(&module_path, name, &args)
    }

    /// Commits the mutation at `path`.
    pub fn mutate(&self, path: &[&str], args: impl IntoArgs) -> Result<(), StoreError> {
        let args = args.into_args().map_err(|e| e.located(&join(path)))?;
        let (module_path, name) = split_path(path)?;
        self.core.mutate_at(&module_path, name, &args)
    }

    /// Dispatches the action at `path`. A pending result is handed back to
    /// the caller; the store never awaits it.
    pub fn dispatch(
        &self,
        path: &[&str],
        args: impl IntoArgs,
    ) -> Result<Option<ActionFuture>, StoreError> {
        let args = args.into_args().map_err(|e| e.located(&join(path)))?;
        let (module_path, name) = split_path(path)?;
        self.core.dispatch_at(&module_path, name, &args)
    }

    /// Looks up the proxy for a registered definition. `None` means the
    /// definition is not part of this store's current tree.
    pub fn get_proxy(&self, definition: &ModuleDefinition) -> Option<ModuleProxy> {
        self.core.proxy_for(definition)
    }

    /// Replaces the whole module tree with a freshly constructed one.
    ///
    /// The module map and the getter/mutation/action aggregates are
    /// rebuilt; the state tree is re-derived from the new tree's defaults.
    /// (The reactive adapter overrides that last part to preserve live
    /// state values.) Proxies resolve by path, so handles captured before
    /// the swap keep working against the new tree.
    pub fn hot_update(&self, root: &ModuleDefinition) -> Result<(), StoreError> {
        debug!(store = self.core.id, "hot updating module tree");
        register(&self.core, root)
    }

    /// A flattened view of every derived-value getter, keyed by dot-joined
    /// path. Parametric getters are skipped.
    pub fn flatten_getters(&self) -> BTreeMap<String, Value> {
        let tree = self.core.getters.read().unwrap().clone();
        let mut out = BTreeMap::new();
        flatten_into(&tree, &mut Vec::new(), &mut out);
        out
    }

    pub(crate) fn install_state_cell(&self, cell: Arc<dyn StateCell>) {
        *self.core.state.write().unwrap() = cell;
    }

    // Observer closures held by the reactivity engine must not keep the
    // store alive; the engine itself is owned by the reactive façade.
    pub(crate) fn downgrade(&self) -> Weak<StoreCore> {
        Arc::downgrade(&self.core)
    }
}

fn split_path<'a>(path: &'a [&'a str]) -> Result<(Vec<String>, &'a str), StoreError> {
    match path.split_last() {
        Some((name, module_path)) => Ok((
            module_path.iter().map(|s| s.to_string()).collect(),
            *name,
        )),
        None => Err(StoreError::PathNotFound {
            path: String::new(),
        }),
    }
}

fn flatten_into(node: &GetterTree, path: &mut Vec<String>, out: &mut BTreeMap<String, Value>) {
    for (name, member) in &node.members {
        if member.kind != GetterKind::Getter {
            continue;
        }
        path.push(name.clone());
        match (member.run)(&[]) {
            Ok(value) => {
                out.insert(join(path), value);
            }
            Err(e) => warn!(getter = %join(path), error = %e, "getter evaluation failed"),
        }
        path.pop();
    }
    for (key, child) in &node.children {
        path.push(key.clone());
        flatten_into(child, path, out);
        path.pop();
    }
}

struct Assets {
    state: Value,
    getters: GetterTree,
    mutations: MutationTree,
    actions: ActionTree,
}

/// Registration: walk the tree claiming identities and creating proxies,
/// then instantiate every node's assets against the new module map. On any
/// failure the previous map is restored and nothing half-built leaks out.
fn register(core: &Arc<StoreCore>, root: &ModuleDefinition) -> Result<(), StoreError> {
    let mut new_map = BTreeMap::new();
    let mut attached = Vec::new();
    if let Err(e) = register_loop(core, &mut new_map, &mut attached, Vec::new(), root) {
        for definition in attached {
            definition.detach();
        }
        return Err(e);
    }

    let old_map = std::mem::replace(&mut *core.module_map.write().unwrap(), new_map);

    match init_assets(core, Vec::new(), root) {
        Ok(assets) => {
            core.state.read().unwrap().replace(assets.state);
            *core.getters.write().unwrap() = Arc::new(assets.getters);
            *core.mutations.write().unwrap() = Arc::new(assets.mutations);
            *core.actions.write().unwrap() = Arc::new(assets.actions);
            for record in old_map.values() {
                trace!(path = %join(&record.path), "module detached");
                record.definition.detach();
            }
            debug!(store = core.id, "module tree registered");
            Ok(())
        }
        Err(e) => {
            let failed = std::mem::replace(&mut *core.module_map.write().unwrap(), old_map);
            for record in failed.values() {
                record.definition.detach();
            }
            Err(e)
        }
    }
}

fn register_loop(
    core: &Arc<StoreCore>,
    map: &mut BTreeMap<u64, ModuleRecord>,
    attached: &mut Vec<ModuleDefinition>,
    path: Vec<String>,
    definition: &ModuleDefinition,
) -> Result<(), StoreError> {
    if map.contains_key(&definition.uid()) || !definition.attach(core.id) {
        return Err(StoreError::DuplicateRegistration {
            uid: definition.uid(),
        });
    }
    attached.push(definition.clone());
    debug!(uid = definition.uid(), path = %join(&path), "registering module");
    map.insert(
        definition.uid(),
        ModuleRecord {
            path: path.clone(),
            definition: definition.clone(),
            proxy: ModuleProxy::new(path.clone(), Arc::downgrade(core)),
        },
    );
    for (key, child) in definition.children() {
        let mut child_path = path.clone();
        child_path.push(key);
        register_loop(core, map, attached, child_path, &child)?;
    }
    Ok(())
}

fn init_assets(
    core: &Arc<StoreCore>,
    path: Vec<String>,
    definition: &ModuleDefinition,
) -> Result<Assets, StoreError> {
    let state = definition
        .init_state()
        .map_err(|e| e.located(&join(&path)))?;
    let mut assets = Assets {
        state,
        getters: init_getters(core, &path, definition)?,
        mutations: init_mutations(core, &path, definition)?,
        actions: init_actions(core, &path, definition)?,
    };

    for (key, child) in definition.children() {
        let mut child_path = path.clone();
        child_path.push(key.clone());
        let child_assets = init_assets(core, child_path, &child)?;
        match &mut assets.state {
            Value::Object(map) => {
                map.insert(key.clone(), child_assets.state);
            }
            _ => return Err(StoreError::InvalidStateShape { path: join(&path) }),
        }
        assets.getters.children.insert(key.clone(), child_assets.getters);
        assets
            .mutations
            .children
            .insert(key.clone(), child_assets.mutations);
        assets.actions.children.insert(key, child_assets.actions);
    }

    Ok(assets)
}

/// Resolves a node's own proxy and its declared dependencies into a scope
/// core. This is the check that catches a module object used without being
/// part of the registered tree, and a dependency that was never registered.
fn build_scope(
    core: &Arc<StoreCore>,
    definition: &ModuleDefinition,
    deps: &[(String, ModuleDefinition)],
) -> Result<ScopeCore, StoreError> {
    let proxy = core
        .proxy_for(definition)
        .ok_or(StoreError::ProxyNotFound)?;
    let mut modules = BTreeMap::new();
    for (key, dep) in deps {
        if modules.contains_key(key) {
            return Err(StoreError::DuplicateDependency { key: key.clone() });
        }
        let dep_proxy = core
            .proxy_for(dep)
            .ok_or_else(|| StoreError::DependencyNotFound { key: key.clone() })?;
        modules.insert(key.clone(), dep_proxy);
    }
    Ok(ScopeCore::live(proxy, modules))
}

fn member_path(path: &[String], name: &str) -> Vec<String> {
    let mut full = path.to_vec();
    full.push(name.to_string());
    full
}

fn init_getters(
    core: &Arc<StoreCore>,
    path: &[String],
    definition: &ModuleDefinition,
) -> Result<GetterTree, StoreError> {
    let Some(def) = &definition.inner.getters else {
        return Ok(GetterTree::default());
    };
    let scope = build_scope(core, definition, &def.deps)?;
    let mut tree = GetterTree::default();
    for entry in def.entries.iter() {
        let full = member_path(path, &entry.name);
        let joined = join(&full);
        let run = entry.run.clone();
        let scope = scope.clone();
        let mut member = GetterMember {
            kind: entry.kind,
            run: Arc::new(move |args: &[Value]| run(&scope, args).map_err(|e| e.located(&joined))),
        };
        if let Some(hook) = &core.hooks.getter {
            member = hook(member, &full);
        }
        tree.members.insert(entry.name.clone(), member);
    }
    Ok(tree)
}

fn init_mutations(
    core: &Arc<StoreCore>,
    path: &[String],
    definition: &ModuleDefinition,
) -> Result<MutationTree, StoreError> {
    let Some(def) = &definition.inner.mutations else {
        return Ok(MutationTree::default());
    };
    // Mutations have no scope; the check that the module is part of the
    // tree still applies.
    if core.proxy_for(definition).is_none() {
        return Err(StoreError::ProxyNotFound);
    }
    let mut tree = MutationTree::default();
    for entry in def.entries.iter() {
        let full = member_path(path, &entry.name);
        let joined = join(&full);
        let module_path = path.to_vec();
        let run = entry.run.clone();
        let weak = Arc::downgrade(core);
        let mut member = MutationMember {
            run: Arc::new(move |args: &[Value]| {
                let core = weak.upgrade().ok_or(StoreError::StoreDetached)?;
                let cell = core.state.read().unwrap().clone();
                let mut outcome: Result<Option<Value>, StoreError> = Ok(None);
                cell.update(&mut |root| {
                    outcome = match get_by_path_mut(root, &module_path) {
                        Some(slot) => run(slot, args),
                        None => Err(StoreError::PathNotFound {
                            path: join(&module_path),
                        }),
                    };
                });
                match outcome.map_err(|e| e.located(&joined))? {
                    Some(_) => Err(StoreError::MutationsMustNotReturn {
                        path: joined.clone(),
                    }),
                    None => {
                        core.notify(&full, args);
                        Ok(())
                    }
                }
            }),
        };
        if let Some(hook) = &core.hooks.mutation {
            member = hook(member, &member_path(path, &entry.name));
        }
        tree.members.insert(entry.name.clone(), member);
    }
    Ok(tree)
}

fn init_actions(
    core: &Arc<StoreCore>,
    path: &[String],
    definition: &ModuleDefinition,
) -> Result<ActionTree, StoreError> {
    let Some(def) = &definition.inner.actions else {
        return Ok(ActionTree::default());
    };
    let scope = Arc::new(build_scope(core, definition, &def.deps)?);
    let mut tree = ActionTree::default();
    for entry in def.entries.iter() {
        let full = member_path(path, &entry.name);
        let joined = join(&full);
        let run = entry.run.clone();
        let scope = scope.clone();
        let mut member = ActionMember {
            run: Arc::new(move |args: &[Value]| {
                match run(&scope, args).map_err(|e| e.located(&joined))? {
                    ActionReturn::Done => Ok(None),
                    ActionReturn::Pending(future) => Ok(Some(future)),
                    ActionReturn::Value(value) if value.is_null() => Ok(None),
                    ActionReturn::Value(_) => Err(StoreError::ActionsInvalidReturn {
                        path: joined.clone(),
                    }),
                }
            }),
        };
        if let Some(hook) = &core.hooks.action {
            member = hook(member, &full);
        }
        tree.members.insert(entry.name.clone(), member);
    }
    Ok(tree)
}

enum SubscriptionKind {
    Mutation {
        id: u64,
        list: Weak<RwLock<Vec<(u64, Arc<SubscriberFn>)>>>,
    },
    Cancel(Option<Box<dyn FnOnce() + Send + Sync>>),
}

/// Handle to an active subscription (mutation subscriber or watcher).
///
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep
/// the subscription alive for the store's lifetime instead.
pub struct Subscription {
    kind: SubscriptionKind,
    active: bool,
}

impl Subscription {
    /// Wraps an engine-specific cancellation closure. Reactivity engines
    /// use this to hand out watch subscriptions.
    pub fn from_cancel(cancel: Box<dyn FnOnce() + Send + Sync>) -> Self {
        Self {
            kind: SubscriptionKind::Cancel(Some(cancel)),
            active: true,
        }
    }

    /// Removes the subscription now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Leaves the subscription installed for the store's lifetime.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        match &mut self.kind {
            SubscriptionKind::Mutation { id, list } => {
                if let Some(list) = list.upgrade() {
                    list.write().unwrap().retain(|(sid, _)| sid != id);
                }
            }
            SubscriptionKind::Cancel(cancel) => {
                if let Some(cancel) = cancel.take() {
                    cancel();
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
