//! # Stratum
//!
//! Typed modular state management for Rust, with hot-swappable module
//! trees and fine-grained reactivity.
//!
//! Stratum provides two levels of abstraction:
//!
//! ## Modules & stores (high-level state management)
//!
//! An application declares a tree of modules, each owning a slice of state
//! plus getters (derived values), mutations (synchronous transitions), and
//! actions (asynchronous workflows):
//! - `module::<S>()` builds a [`ModuleDefinition`]; trees compose with
//!   `.child(key, module)`
//! - [`create_store`] turns a tree into a [`ReactiveStore`] with memoized
//!   getters, mutation subscriptions, `watch`, strict mode, and
//!   state-preserving hot swaps
//! - [`inject`] declares typed cross-module dependencies, resolved lazily
//!   by path wherever the dependency lives in the tree
//! - [`testing::stub`] builds standalone member instances for unit tests
//!
//! ## Signals (low-level primitives)
//!
//! Fine-grained reactive primitives backing the built-in engine:
//! - [`Signal<T>`](Signal) - Reactive values that notify dependents when
//!   changed
//! - [`Memo<T>`](Memo) - Computed values that automatically track
//!   dependencies
//! - [`Effect`] - Side effects that run when dependencies change
//!
//! The store consumes reactivity through the [`ReactiveEngine`] capability
//! set, so a different engine can be threaded in through
//! [`StoreOptions::engine`].

pub mod devtools;
pub mod error;
pub mod module;
pub mod reactive;
pub mod runtime;
pub mod signal;
pub mod store;
pub mod testing;

mod path;

// Re-export main types for convenience
pub use error::StoreError;
pub use module::{
    inject, module, ActionFuture, ActionReturn, ActionSchema, ActionScope, GetterSchema,
    GetterScope, Injected, IntoArgs, ModuleBuilder, ModuleDefinition, ModuleHandle, ModuleProxy,
    ModuleState, ModuleView, MutationSchema,
};
pub use reactive::{
    create_store, GettersView, Plugin, ReactiveEngine, ReactiveStore, SignalEngine, StoreOptions,
    WatchOptions, WeakReactiveStore,
};
pub use signal::{create_effect, create_memo, create_signal, Effect, Memo, Signal};
pub use store::{Store, Subscription};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Default)]
    struct CounterState {
        count: i64,
    }

    #[test]
    fn it_works() {
        // Basic smoke test
        let counter = module::<CounterState>()
            .state(CounterState::default)
            .mutations(|m| {
                m.mutation("inc", |state: &mut CounterState, n: i64| state.count += n);
            })
            .finish()
            .unwrap();

        let store = create_store(&counter, StoreOptions::default()).unwrap();
        store.mutate(&["inc"], (42,)).unwrap();
        assert_eq!(store.state()["count"], 42);
    }
}
