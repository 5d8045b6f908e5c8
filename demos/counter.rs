//! Two counter modules composed under one store, with a mutation
//! subscriber, a memoized getter, and an async action.

use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stratum::{
    create_store, module, ActionFuture, ActionScope, GetterScope, ModuleDefinition, StoreError,
    StoreOptions, WatchOptions,
};

#[derive(Serialize, Deserialize, Default)]
struct CounterState {
    count: i64,
}

fn counter() -> ModuleDefinition {
    module::<CounterState>()
        .state(CounterState::default)
        .getters(|g| {
            g.getter("doubled", |s: &GetterScope<CounterState>| s.state().count * 2);
        })
        .mutations(|m| {
            m.mutation("inc", |state: &mut CounterState, n: i64| state.count += n);
        })
        .actions(|a| {
            a.action(
                "inc_async",
                |scope: ActionScope<CounterState>, n: i64| -> Result<ActionFuture, StoreError> {
                    Ok(Box::pin(async move {
                        scope.commit("inc", (n,)).expect("inc should commit");
                        json!(scope.state().count)
                    }))
                },
            );
        })
        .finish()
        .expect("counter module builds")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let a = counter();
    let b = counter();
    let root = module::<serde_json::Value>()
        .finish()
        .expect("root module builds")
        .child("a", &a)
        .expect("unique key")
        .child("b", &b)
        .expect("unique key");

    let store = create_store(&root, StoreOptions::default()).expect("store builds");

    store
        .subscribe(|path, args, state| {
            println!("mutation {} {:?} -> {}", path.join("."), args, state);
        })
        .detach();

    store
        .watch(
            |_state, getters| getters.raw(&["a", "doubled"]),
            |new, old| println!("a.doubled changed: {old} -> {new}"),
            WatchOptions::default(),
        )
        .detach();

    store.mutate(&["a", "inc"], (3,)).expect("mutation runs");
    store.mutate(&["b", "inc"], (1,)).expect("mutation runs");

    let pending = store
        .dispatch(&["a", "inc_async"], (4,))
        .expect("action dispatches")
        .expect("inc_async returns a future");
    let count = block_on(pending);

    println!("a.count = {count}");
    println!("a.doubled = {}", store.getter::<i64>(&["a", "doubled"]).unwrap());
    println!("state = {}", store.state());
}
