use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Reactive context for tracking dependencies.
struct ReactiveContext {
    current_observer: Option<usize>,
    // Map from signal ID to set of observer IDs that depend on it
    dependencies: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to set of signal IDs it depends on
    observer_deps: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to the effect function
    observers: HashMap<usize, Arc<dyn Fn() + Send + Sync>>,
    // Map from memo ID to dirty state
    memo_dirty: HashMap<usize, bool>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            current_observer: None,
            dependencies: HashMap::new(),
            observer_deps: HashMap::new(),
            observers: HashMap::new(),
            memo_dirty: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.current_observer = None;
        self.dependencies.clear();
        self.observer_deps.clear();
        self.observers.clear();
        self.memo_dirty.clear();
    }

    fn drop_observer_deps(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for signal_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&signal_id) {
                    deps.remove(&observer_id);
                }
            }
        }
    }
}

/// Inner runtime state that can be shared.
pub struct RuntimeInner {
    context: Mutex<ReactiveContext>,
}

impl RuntimeInner {
    fn new() -> Self {
        Self {
            context: Mutex::new(ReactiveContext::new()),
        }
    }

    pub fn remove_observer(&self, observer_id: usize) {
        let mut ctx = self.context.lock().unwrap();
        ctx.observers.remove(&observer_id);
        ctx.memo_dirty.remove(&observer_id);
        ctx.drop_observer_deps(observer_id);
    }

    fn clear(&self) {
        let mut ctx = self.context.lock().unwrap();
        ctx.clear();
    }
}

/// Hybrid reactive runtime for managing reactive primitives.
///
/// Supports both a global runtime (default) and scoped runtimes for
/// isolation. The runtime tracks dependencies between signals, effects, and
/// memos, and manages the reactive graph. Every store engine owns its own
/// runtime instance, so independent stores never share a dependency graph.
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    inner: Arc<RwLock<RuntimeInner>>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
}

impl ReactiveRuntime {
    /// Create a new isolated runtime with its own dependency graph.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            inner: Arc::new(RwLock::new(RuntimeInner::new())),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// The runtime and all its state is cleaned up when the function
    /// returns.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Arc<Self> {
        use std::sync::OnceLock;
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current reactive runtime (scoped or global fallback).
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::global)
        })
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// Pushes the runtime onto the thread-local stack for the duration of
    /// the function execution. Re-entrant pushes of the same runtime are
    /// fine; the innermost frame wins.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Clear all observers, dependencies, and state from this runtime.
    pub fn clear(&self) {
        self.inner.read().unwrap().clear();
        self.next_id.store(0, Ordering::SeqCst);
    }

    /// Get a reference to the inner runtime state.
    pub fn inner(&self) -> Arc<RwLock<RuntimeInner>> {
        Arc::clone(&self.inner)
    }

    /// Generate the next unique ID for a reactive primitive.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Track a read of a signal by the current observer.
    pub fn track_read(&self, signal_id: usize) {
        let inner = self.inner.read().unwrap();
        let mut ctx = inner.context.lock().unwrap();
        if let Some(current_observer) = ctx.current_observer {
            ctx.dependencies
                .entry(signal_id)
                .or_default()
                .insert(current_observer);
            ctx.observer_deps
                .entry(current_observer)
                .or_default()
                .insert(signal_id);
        }
    }

    /// Notify all observers that depend on a signal.
    pub fn notify_observers(&self, signal_id: usize) {
        let observers = {
            let inner = self.inner.read().unwrap();
            let ctx = inner.context.lock().unwrap();
            ctx.dependencies
                .get(&signal_id)
                .map(|obs| obs.iter().copied().collect::<Vec<_>>())
        };

        if let Some(observers) = observers {
            for observer_id in observers {
                self.mark_observer_dirty(observer_id);
            }
        }
    }

    /// Mark an observer (memo or effect) as dirty and propagate to dependents.
    fn mark_observer_dirty(&self, observer_id: usize) {
        let inner = self.inner.read().unwrap();
        let mut ctx = inner.context.lock().unwrap();

        // Memos are marked dirty and their dependents notified; they do not
        // recompute until the next read.
        if ctx.memo_dirty.contains_key(&observer_id) {
            let already_dirty = ctx.memo_dirty.get(&observer_id).copied().unwrap_or(false);
            if !already_dirty {
                ctx.memo_dirty.insert(observer_id, true);

                let dependents = ctx
                    .dependencies
                    .get(&observer_id)
                    .map(|deps| deps.iter().copied().collect::<Vec<_>>());

                drop(ctx);
                drop(inner);

                if let Some(dependents) = dependents {
                    for dependent_id in dependents {
                        self.mark_observer_dirty(dependent_id);
                    }
                }
            }
            return;
        }

        // Effects run immediately. Locks must be released first because the
        // effect body is arbitrary user code.
        let effect = ctx.observers.get(&observer_id).cloned();
        drop(ctx);
        drop(inner);

        if let Some(effect) = effect {
            effect();
        }
    }

    /// Register an observer's effect function.
    pub fn create_observer<F>(&self, observer_id: usize, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = self.inner.read().unwrap();
        let mut ctx = inner.context.lock().unwrap();
        ctx.drop_observer_deps(observer_id);
        ctx.observers.insert(observer_id, Arc::new(f));
    }

    /// Run a function with a specific observer as the current context.
    pub fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let inner = self.inner.read().unwrap();
        let prev = {
            let mut ctx = inner.context.lock().unwrap();
            ctx.current_observer.replace(observer_id)
        };

        let result = f();

        let mut ctx = inner.context.lock().unwrap();
        ctx.current_observer = prev;

        result
    }

    /// Drop an observer's stale dependency edges and run `f` with the
    /// observer as the current context, re-tracking every read. Observers
    /// whose dependency set changes between runs (conditional reads, hot
    /// swaps) stay correct this way.
    pub fn run_tracked<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        {
            let inner = self.inner.read().unwrap();
            let mut ctx = inner.context.lock().unwrap();
            ctx.drop_observer_deps(observer_id);
        }
        self.with_observer(observer_id, f)
    }

    /// Register a memo and mark it as dirty initially.
    pub fn register_memo(&self, memo_id: usize) {
        let inner = self.inner.read().unwrap();
        let mut ctx = inner.context.lock().unwrap();
        ctx.memo_dirty.insert(memo_id, true);
    }

    /// Check if a memo is dirty (needs recomputation).
    pub fn is_memo_dirty(&self, memo_id: usize) -> bool {
        let inner = self.inner.read().unwrap();
        let ctx = inner.context.lock().unwrap();
        ctx.memo_dirty.get(&memo_id).copied().unwrap_or(true)
    }

    /// Mark a memo as clean (after recomputation).
    pub fn mark_memo_clean(&self, memo_id: usize) {
        let inner = self.inner.read().unwrap();
        let mut ctx = inner.context.lock().unwrap();
        ctx.memo_dirty.insert(memo_id, false);
    }
}
