//! Integration tests for the module composition and store runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stratum::{
    create_store, module, ActionFuture, ActionScope, GetterScope, ModuleDefinition, Store,
    StoreError, StoreOptions,
};

#[derive(Serialize, Deserialize, Default)]
struct CounterState {
    count: i64,
}

fn counter_module() -> ModuleDefinition {
    module::<CounterState>()
        .state(CounterState::default)
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
        .unwrap()
}

#[test]
fn composes_the_state_tree() {
    #[derive(Serialize, Deserialize)]
    struct Foo {
        a: i64,
    }
    #[derive(Serialize, Deserialize)]
    struct Bar {
        b: i64,
    }
    #[derive(Serialize, Deserialize)]
    struct Baz {
        c: i64,
    }
    #[derive(Serialize, Deserialize)]
    struct Qux {
        d: i64,
    }

    let qux = module::<Qux>().state(|| Qux { d: 4 }).finish().unwrap();
    let baz = module::<Baz>()
        .state(|| Baz { c: 3 })
        .finish()
        .unwrap()
        .child("qux", &qux)
        .unwrap();
    let bar = module::<Bar>().state(|| Bar { b: 2 }).finish().unwrap();
    let foo = module::<Foo>()
        .state(|| Foo { a: 1 })
        .finish()
        .unwrap()
        .child("bar", &bar)
        .unwrap()
        .child("baz", &baz)
        .unwrap();

    let store = Store::new(&foo).unwrap();
    let state = store.state();
    assert_eq!(state["a"], 1);
    assert_eq!(state["bar"]["b"], 2);
    assert_eq!(state["baz"]["c"], 3);
    assert_eq!(state["baz"]["qux"]["d"], 4);
}

#[test]
fn provides_getters() {
    #[derive(Serialize, Deserialize)]
    struct FooState {
        a: i64,
    }
    #[derive(Serialize, Deserialize)]
    struct BarState {
        b: i64,
    }

    let bar = module::<BarState>()
        .state(|| BarState { b: 2 })
        .getters(|g| {
            g.getter("b", |s: &GetterScope<BarState>| s.state().b + 2);
            g.method("c", |s: &GetterScope<BarState>, n: i64| s.state().b + n);
        })
        .finish()
        .unwrap();
    let foo = module::<FooState>()
        .state(|| FooState { a: 1 })
        .getters(|g| {
            g.getter("a", |s: &GetterScope<FooState>| s.state().a + 1);
        })
        .finish()
        .unwrap()
        .child("bar", &bar)
        .unwrap();

    let store = Store::new(&foo).unwrap();
    assert_eq!(store.getter::<i64>(&["a"]).unwrap(), 2);
    assert_eq!(store.getter::<i64>(&["bar", "b"]).unwrap(), 4);
    assert_eq!(store.call_getter::<i64>(&["bar", "c"], (3,)).unwrap(), 5);

    // getters recompute against replaced state
    store.replace_state(json!({ "a": 11, "bar": { "b": 22 } }));
    assert_eq!(store.getter::<i64>(&["a"]).unwrap(), 12);
    assert_eq!(store.getter::<i64>(&["bar", "b"]).unwrap(), 24);
    assert_eq!(store.call_getter::<i64>(&["bar", "c"], (3,)).unwrap(), 25);
}

#[test]
fn getters_can_read_sibling_getters() {
    #[derive(Serialize, Deserialize)]
    struct FooState {
        value: String,
    }

    let foo = module::<FooState>()
        .state(|| FooState {
            value: "foo".into(),
        })
        .getters(|g| {
            g.getter("double", |s: &GetterScope<FooState>| {
                let value = s.state().value;
                format!("{value}{value}")
            });
            g.getter("double_upper", |s: &GetterScope<FooState>| {
                s.get::<String>("double").to_uppercase()
            });
        })
        .finish()
        .unwrap();

    let store = Store::new(&foo).unwrap();
    assert_eq!(
        store.getter::<String>(&["double_upper"]).unwrap(),
        "FOOFOO"
    );
}

#[test]
fn provides_mutations_at_every_depth() {
    #[derive(Serialize, Deserialize, Default)]
    struct S {
        hits: Vec<i64>,
    }

    fn leaf() -> ModuleDefinition {
        module::<S>()
            .state(S::default)
            .mutations(|m| {
                m.mutation("push", |state: &mut S, n: i64| state.hits.push(n));
            })
            .finish()
            .unwrap()
    }

    let baz = leaf();
    let bar = leaf().child("baz", &baz).unwrap();
    let foo = leaf().child("bar", &bar).unwrap();

    let store = Store::new(&foo).unwrap();
    store.mutate(&["push"], (5,)).unwrap();
    store.mutate(&["bar", "push"], (10,)).unwrap();
    store.mutate(&["bar", "baz", "push"], (15,)).unwrap();

    let state = store.state();
    assert_eq!(state["hits"], json!([5]));
    assert_eq!(state["bar"]["hits"], json!([10]));
    assert_eq!(state["bar"]["baz"]["hits"], json!([15]));
}

#[test]
fn mutations_update_state_synchronously() {
    let store = Store::new(&counter_module()).unwrap();
    assert_eq!(store.state()["count"], 0);
    store.mutate(&["inc"], (1,)).unwrap();
    assert_eq!(store.state()["count"], 1);
}

#[test]
fn mutations_must_not_return_values() {
    #[derive(Serialize, Deserialize, Default)]
    struct S {
        value: i64,
    }

    let m = module::<S>()
        .state(S::default)
        .mutations(|m| {
            m.mutation("ok", |state: &mut S| state.value += 1);
            m.mutation("bad", |state: &mut S| -> Value {
                state.value += 1;
                json!(state.value)
            });
        })
        .finish()
        .unwrap();

    let store = Store::new(&m).unwrap();
    store.mutate(&["ok"], ()).unwrap();
    assert_eq!(store.state()["value"], 1);

    let err = store.mutate(&["bad"], ()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::MutationsMustNotReturn { path } if path == "bad"
    ));
    // the write itself still landed; only the contract check failed
    assert_eq!(store.state()["value"], 2);
}

#[test]
fn mutation_subscribers_see_path_args_and_state() {
    let store = Store::new(&counter_module()).unwrap();
    let seen: Arc<Mutex<Vec<(Vec<String>, Vec<Value>, Value)>>> = Arc::new(Mutex::new(Vec::new()));

    let subscription = store.subscribe({
        let seen = seen.clone();
        move |path, args, state| {
            seen.lock()
                .unwrap()
                .push((path.to_vec(), args.to_vec(), state.clone()));
        }
    });

    store.mutate(&["inc"], (5,)).unwrap();
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec!["inc".to_string()]);
        assert_eq!(seen[0].1, vec![json!(5)]);
        assert_eq!(seen[0].2["count"], 5);
    }

    subscription.unsubscribe();
    store.mutate(&["inc"], (1,)).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn actions_reach_state_getters_and_mutations() {
    #[derive(Serialize, Deserialize)]
    struct FooState {
        value: i64,
    }

    let done = Arc::new(AtomicBool::new(false));
    let done_flag = done.clone();

    let foo = module::<FooState>()
        .state(|| FooState { value: 1 })
        .getters(|g| {
            g.getter("plus1", |s: &GetterScope<FooState>| s.state().value + 1);
        })
        .mutations(|m| {
            m.mutation("inc", |state: &mut FooState, n: i64| state.value += n);
        })
        .actions(move |a| {
            let done = done_flag.clone();
            a.action(
                "test",
                move |scope: ActionScope<FooState>| -> Result<(), StoreError> {
                    assert_eq!(scope.state().value, 1);
                    assert_eq!(scope.getter::<i64>("plus1")?, 2);
                    scope.commit("inc", (1,))?;
                    assert_eq!(scope.state().value, 2);
                    done.store(true, Ordering::SeqCst);
                    Ok(())
                },
            );
        })
        .finish()
        .unwrap();

    let store = Store::new(&foo).unwrap();
    assert!(store.dispatch(&["test"], ()).unwrap().is_none());
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn actions_can_dispatch_sibling_actions() {
    let called = Arc::new(AtomicBool::new(false));
    let called_flag = called.clone();

    let foo = module::<Value>()
        .actions(move |a| {
            let called = called_flag.clone();
            a.action(
                "caller",
                |scope: ActionScope<Value>| -> Result<(), StoreError> {
                    scope.dispatch("callee", ())?;
                    Ok(())
                },
            );
            a.action("callee", move |_scope: ActionScope<Value>| {
                called.store(true, Ordering::SeqCst);
            });
        })
        .finish()
        .unwrap();

    let store = Store::new(&foo).unwrap();
    store.dispatch(&["caller"], ()).unwrap();
    assert!(called.load(Ordering::SeqCst));
}

#[test]
fn actions_must_return_nothing_or_a_future() {
    let m = module::<Value>()
        .actions(|a| {
            a.action("bad", |_scope: ActionScope<Value>| json!(1));
            a.action("null_is_fine", |_scope: ActionScope<Value>| Value::Null);
        })
        .finish()
        .unwrap();

    let store = Store::new(&m).unwrap();
    let err = match store.dispatch(&["bad"], ()) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(
        err,
        StoreError::ActionsInvalidReturn { path } if path == "bad"
    ));
    assert!(store.dispatch(&["null_is_fine"], ()).unwrap().is_none());
}

#[tokio::test]
async fn async_actions_resolve_after_committing() {
    let store = create_store(&counter_module(), StoreOptions::default()).unwrap();

    let pending = store
        .dispatch(&["inc_async"], (5,))
        .unwrap()
        .expect("inc_async returns a future");
    let resolved = pending.await;

    assert_eq!(resolved, json!(5));
    assert_eq!(store.state()["count"], 5);
}

#[test]
fn sibling_counters_stay_independent() {
    let a = counter_module();
    let b = counter_module();
    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("a", &a)
        .unwrap()
        .child("b", &b)
        .unwrap();

    let store = create_store(&root, StoreOptions::default()).unwrap();
    store.mutate(&["a", "inc"], (3,)).unwrap();
    store.mutate(&["a", "inc"], (4,)).unwrap();
    store.mutate(&["b", "inc"], (1,)).unwrap();

    assert_eq!(store.state()["a"]["count"], 7);
    assert_eq!(store.state()["b"]["count"], 1);
}

#[test]
fn duplicate_child_keys_are_rejected() {
    let foo = module::<Value>().finish().unwrap();
    let bar = module::<Value>().finish().unwrap();

    let err = match module::<Value>()
        .finish()
        .unwrap()
        .child("foo", &foo)
        .unwrap()
        .child("foo", &bar)
    {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(err, StoreError::DuplicateChildKey { key } if key == "foo"));
}

#[test]
fn one_definition_cannot_sit_at_two_paths() {
    let m = module::<Value>().finish().unwrap();
    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("a", &m)
        .unwrap()
        .child("b", &m)
        .unwrap();

    let err = match Store::new(&root) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(err, StoreError::DuplicateRegistration { .. }));
}

#[test]
fn one_definition_cannot_live_in_two_stores() {
    let shared = counter_module();
    let root_a = module::<Value>()
        .finish()
        .unwrap()
        .child("shared", &shared)
        .unwrap();
    let root_b = module::<Value>()
        .finish()
        .unwrap()
        .child("shared", &shared)
        .unwrap();

    let store_a = Store::new(&root_a).unwrap();
    let err = match Store::new(&root_b) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(err, StoreError::DuplicateRegistration { .. }));

    // releasing the first store frees the tree for reuse
    drop(store_a);
    assert!(Store::new(&root_b).is_ok());
}

#[test]
fn aggregate_trees_are_congruent() {
    #[derive(Serialize, Deserialize, Default)]
    struct S {
        n: i64,
    }

    fn node() -> ModuleDefinition {
        module::<S>()
            .state(S::default)
            .getters(|g| {
                g.getter("n", |s: &GetterScope<S>| s.state().n);
            })
            .mutations(|m| {
                m.mutation("set", |state: &mut S, n: i64| state.n = n);
            })
            .finish()
            .unwrap()
    }

    let leaf = node();
    let mid = node().child("leaf", &leaf).unwrap();
    let root = node().child("mid", &mid).unwrap();

    let store = Store::new(&root).unwrap();

    // state keys mirror the module tree at every depth
    let state = store.state();
    assert!(state.get("n").is_some());
    assert!(state["mid"].get("n").is_some());
    assert!(state["mid"]["leaf"].get("n").is_some());

    // the getter aggregate resolves along the same paths
    let flat = store.flatten_getters();
    assert_eq!(
        flat.keys().cloned().collect::<Vec<_>>(),
        vec!["mid.leaf.n", "mid.n", "n"]
    );

    // and so does the mutation aggregate
    store.mutate(&["set"], (1,)).unwrap();
    store.mutate(&["mid", "set"], (2,)).unwrap();
    store.mutate(&["mid", "leaf", "set"], (3,)).unwrap();
    assert_eq!(store.getter::<i64>(&["n"]).unwrap(), 1);
    assert_eq!(store.getter::<i64>(&["mid", "n"]).unwrap(), 2);
    assert_eq!(store.getter::<i64>(&["mid", "leaf", "n"]).unwrap(), 3);
}

#[test]
fn unknown_paths_and_members_fail_cleanly() {
    let store = Store::new(&counter_module()).unwrap();
    assert!(matches!(
        store.mutate(&["nope", "inc"], ()),
        Err(StoreError::PathNotFound { .. })
    ));
    assert!(matches!(
        store.mutate(&["dec"], ()),
        Err(StoreError::MemberNotFound { .. })
    ));
    assert!(matches!(
        store.mutate(&["inc"], ("five",)),
        Err(StoreError::InvalidArgs { .. })
    ));
}
