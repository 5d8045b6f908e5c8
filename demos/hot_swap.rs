//! Hot-swapping a module tree while external bindings stay live.

use serde::{Deserialize, Serialize};
use stratum::{
    create_store, module, GetterScope, ModuleDefinition, StoreOptions, WatchOptions,
};

#[derive(Serialize, Deserialize)]
struct Greeting {
    name: String,
}

fn greeter(template: &'static str) -> ModuleDefinition {
    module::<Greeting>()
        .state(|| Greeting {
            name: "world".into(),
        })
        .getters(move |g| {
            g.getter("message", move |s: &GetterScope<Greeting>| {
                template.replace("{}", &s.state().name)
            });
        })
        .mutations(|m| {
            m.mutation("rename", |state: &mut Greeting, name: String| {
                state.name = name;
            });
        })
        .finish()
        .expect("greeter module builds")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let store = create_store(&greeter("Hello, {}!"), StoreOptions::default())
        .expect("store builds");

    // a binding that outlives the swap
    store
        .watch(
            |_state, getters| getters.raw(&["message"]),
            |new, old| println!("message changed: {old} -> {new}"),
            WatchOptions::default(),
        )
        .detach();

    store.mutate(&["rename"], ("stratum",)).expect("rename runs");
    println!("before swap: {}", store.getter::<String>(&["message"]).unwrap());

    // swap in a new implementation; state survives, getters are rebuilt
    store
        .hot_update(&greeter("Bonjour, {}!"))
        .expect("hot swap succeeds");

    println!("after swap:  {}", store.getter::<String>(&["message"]).unwrap());
    println!("state survived: {}", store.state());
}
