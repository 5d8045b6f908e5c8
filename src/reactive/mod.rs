//! The reactive adapter: bridges the bare store runtime onto a host
//! reactivity engine, with memoized getters, watch, strict mode, and
//! state-preserving hot swaps.

mod engine;
mod store;

pub use engine::{
    Derived, ReactiveCell, ReactiveEngine, SignalEngine, WatchCallback, WatchOptions, WatchSource,
};
pub use store::{
    create_store, GettersView, Plugin, ReactiveStore, StoreOptions, WeakReactiveStore,
};
