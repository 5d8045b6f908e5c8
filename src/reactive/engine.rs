//! The host-reactivity capability set and its built-in implementation.
//!
//! The store needs exactly three capabilities from a reactivity engine:
//! make a value reactive, make a derived value, and observe a computed
//! value for changes. Engines are explicit instances threaded through
//! store construction, never a process-wide installation.

use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::runtime::ReactiveRuntime;
use crate::signal::{Memo, Signal};
use crate::store::Subscription;

/// Options for an observation.
///
/// The built-in engine compares whole values and runs observers
/// synchronously inside the notifying write, so the only knob left is
/// whether the callback fires once immediately with the current value.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
    pub immediate: bool,
}

/// A reactive container holding one value. Reads inside an observer are
/// tracked; writes notify dependents.
pub trait ReactiveCell: Send + Sync {
    fn get(&self) -> Value;
    fn set(&self, value: Value);
    fn update(&self, f: &mut dyn FnMut(&mut Value));
}

/// A memoized derived value. Recomputes only when tracked dependencies
/// change; the invalidation bookkeeping belongs to the engine.
pub trait Derived: Send + Sync {
    fn get(&self) -> Value;
}

pub type WatchSource = Box<dyn Fn() -> Value + Send + Sync>;
pub type WatchCallback = Box<dyn Fn(&Value, &Value) + Send + Sync>;

/// The capability set the store requires from a host reactivity engine.
pub trait ReactiveEngine: Send + Sync + 'static {
    /// Wraps a value in a reactive container.
    fn cell(&self, initial: Value) -> Arc<dyn ReactiveCell>;

    /// Builds a memoized derived value from a computation.
    fn derived(&self, compute: Box<dyn Fn() -> Value + Send + Sync>) -> Arc<dyn Derived>;

    /// Observes a computed value, invoking `callback(new, old)` when it
    /// changes.
    fn observe(
        &self,
        source: WatchSource,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> Subscription;
}

/// The built-in engine: fine-grained signals, memos, and observers over an
/// isolated [`ReactiveRuntime`] instance per engine.
pub struct SignalEngine {
    runtime: Arc<ReactiveRuntime>,
}

impl SignalEngine {
    pub fn new() -> Self {
        Self {
            runtime: ReactiveRuntime::new(),
        }
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct SignalCell {
    runtime: Arc<ReactiveRuntime>,
    signal: Signal<Value>,
}

impl ReactiveCell for SignalCell {
    fn get(&self) -> Value {
        ReactiveRuntime::with_runtime(self.runtime.clone(), || self.signal.get())
    }

    fn set(&self, value: Value) {
        ReactiveRuntime::with_runtime(self.runtime.clone(), || self.signal.set(value));
    }

    fn update(&self, f: &mut dyn FnMut(&mut Value)) {
        ReactiveRuntime::with_runtime(self.runtime.clone(), || self.signal.update(|v| f(v)));
    }
}

struct SignalDerived {
    runtime: Arc<ReactiveRuntime>,
    memo: Memo<Value>,
}

impl Derived for SignalDerived {
    fn get(&self) -> Value {
        ReactiveRuntime::with_runtime(self.runtime.clone(), || self.memo.get())
    }
}

impl ReactiveEngine for SignalEngine {
    fn cell(&self, initial: Value) -> Arc<dyn ReactiveCell> {
        let signal = ReactiveRuntime::with_runtime(self.runtime.clone(), || Signal::new(initial));
        Arc::new(SignalCell {
            runtime: self.runtime.clone(),
            signal,
        })
    }

    fn derived(&self, compute: Box<dyn Fn() -> Value + Send + Sync>) -> Arc<dyn Derived> {
        let memo =
            ReactiveRuntime::with_runtime(self.runtime.clone(), || Memo::new(move || compute()));
        Arc::new(SignalDerived {
            runtime: self.runtime.clone(),
            memo,
        })
    }

    fn observe(
        &self,
        source: WatchSource,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> Subscription {
        let runtime = self.runtime.clone();
        ReactiveRuntime::with_runtime(runtime.clone(), || {
            let id = runtime.next_id();
            let source = Arc::new(source);
            let callback = Arc::new(callback);
            let previous: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));

            {
                let source = source.clone();
                let callback = callback.clone();
                let previous = previous.clone();
                runtime.create_observer(id, move || {
                    let runtime = ReactiveRuntime::current();
                    let next = runtime.run_tracked(id, || source());
                    let old = {
                        let mut slot = previous.lock().unwrap();
                        if slot.as_ref() == Some(&next) {
                            return;
                        }
                        slot.replace(next.clone())
                    };
                    if let Some(old) = old {
                        callback(&next, &old);
                    }
                });
            }

            let first = runtime.run_tracked(id, || source());
            *previous.lock().unwrap() = Some(first.clone());
            if options.immediate {
                callback(&first, &first);
            }

            let inner = Arc::downgrade(&runtime.inner());
            Subscription::from_cancel(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    if let Ok(inner) = inner.read() {
                        inner.remove_observer(id);
                    }
                }
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn derived_values_memoize_over_cells() {
        let engine = SignalEngine::new();
        let cell = engine.cell(json!(2));
        let computations = Arc::new(AtomicUsize::new(0));

        let doubled = engine.derived(Box::new({
            let cell = cell.clone();
            let computations = computations.clone();
            move || {
                computations.fetch_add(1, Ordering::SeqCst);
                json!(cell.get().as_i64().unwrap() * 2)
            }
        }));

        assert_eq!(doubled.get(), json!(4));
        assert_eq!(doubled.get(), json!(4));
        assert_eq!(computations.load(Ordering::SeqCst), 1);

        cell.set(json!(5));
        assert_eq!(doubled.get(), json!(10));
        assert_eq!(computations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observers_fire_on_change_and_cancel() {
        let engine = SignalEngine::new();
        let cell = engine.cell(json!(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let subscription = engine.observe(
            Box::new({
                let cell = cell.clone();
                move || cell.get()
            }),
            Box::new({
                let fired = fired.clone();
                move |_, _| {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            }),
            WatchOptions::default(),
        );

        cell.set(json!(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // unchanged value, no notification
        cell.set(json!(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        cell.set(json!(2));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
