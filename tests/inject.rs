//! Cross-module dependency injection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum::{
    inject, module, ActionScope, GetterScope, ModuleDefinition, Store, StoreError,
};

#[derive(Serialize, Deserialize)]
struct AState {
    value: i64,
}

fn counter() -> ModuleDefinition {
    module::<AState>()
        .state(|| AState { value: 1 })
        .getters(|g| {
            g.getter("a", |s: &GetterScope<AState>| s.state().value + 1);
        })
        .mutations(|m| {
            m.mutation("inc", |state: &mut AState| state.value += 1);
        })
        .actions(|a| {
            a.action(
                "inc",
                |scope: ActionScope<AState>| -> Result<(), StoreError> {
                    scope.commit("inc", ())
                },
            );
        })
        .finish()
        .unwrap()
}

#[test]
fn getters_see_injected_modules() {
    let counter = counter();

    let foo = module::<Value>()
        .getters_with(inject("counter", &counter), |g| {
            g.getter("state_test", |s: &GetterScope<Value>| {
                s.module("counter").state::<AState>().value
            });
            g.getter("getter_test", |s: &GetterScope<Value>| {
                s.module("counter").getter::<i64>("a")
            });
        })
        .finish()
        .unwrap();

    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("foo", &foo)
        .unwrap()
        .child("counter", &counter)
        .unwrap();
    let store = Store::new(&root).unwrap();

    assert_eq!(store.getter::<i64>(&["foo", "state_test"]).unwrap(), 1);
    assert_eq!(store.getter::<i64>(&["foo", "getter_test"]).unwrap(), 2);

    store.mutate(&["counter", "inc"], ()).unwrap();
    assert_eq!(store.getter::<i64>(&["foo", "state_test"]).unwrap(), 2);
    assert_eq!(store.getter::<i64>(&["foo", "getter_test"]).unwrap(), 3);
}

#[test]
fn actions_see_injected_modules() {
    let counter = counter();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_flag = ran.clone();

    let foo = module::<Value>()
        .actions_with(inject("counter", &counter), move |a| {
            let ran = ran_flag.clone();
            a.action(
                "test",
                move |scope: ActionScope<Value>| -> Result<(), StoreError> {
                    let counter = scope.module("counter")?;
                    assert_eq!(counter.state::<AState>()?.value, 1);
                    assert_eq!(counter.getter::<i64>("a")?, 2);
                    counter.dispatch("inc", ())?;
                    assert_eq!(counter.state::<AState>()?.value, 2);
                    counter.commit("inc", ())?;
                    assert_eq!(counter.state::<AState>()?.value, 3);
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            );
        })
        .finish()
        .unwrap();

    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("foo", &foo)
        .unwrap()
        .child("counter", &counter)
        .unwrap();
    let store = Store::new(&root).unwrap();

    store.dispatch(&["foo", "test"], ()).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn modules_with_dependencies_still_mutate_their_own_state() {
    #[derive(Serialize, Deserialize)]
    struct FooState {
        value: i64,
    }

    let counter = counter();
    let foo = module::<FooState>()
        .state(|| FooState { value: 1 })
        .getters_with(inject("counter", &counter), |g| {
            g.getter("other", |s: &GetterScope<FooState>| {
                s.module("counter").state::<AState>().value
            });
        })
        .mutations(|m| {
            m.mutation("inc", |state: &mut FooState| state.value += 1);
        })
        .finish()
        .unwrap();

    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("foo", &foo)
        .unwrap()
        .child("counter", &counter)
        .unwrap();
    let store = Store::new(&root).unwrap();

    assert_eq!(store.state()["foo"]["value"], 1);
    store.mutate(&["foo", "inc"], ()).unwrap();
    assert_eq!(store.state()["foo"]["value"], 2);
}

#[test]
fn dependencies_resolve_wherever_they_live_in_the_tree() {
    let a = counter();
    let b = counter();
    let checked = Arc::new(AtomicUsize::new(0));
    let checked_flag = checked.clone();

    let foo = module::<Value>()
        .getters_with(inject("a", &a).and("b", &b), |g| {
            g.getter("a_test", |s: &GetterScope<Value>| {
                s.module("a").getter::<i64>("a")
            });
            g.getter("b_test", |s: &GetterScope<Value>| {
                s.module("b").getter::<i64>("a")
            });
        })
        .actions_with(inject("a", &a).and("b", &b), move |ac| {
            let checked = checked_flag.clone();
            ac.action(
                "both",
                move |scope: ActionScope<Value>| -> Result<(), StoreError> {
                    for key in ["a", "b"] {
                        let dep = scope.module(key)?;
                        assert_eq!(dep.state::<AState>()?.value, 1);
                        assert_eq!(dep.getter::<i64>("a")?, 2);
                        dep.dispatch("inc", ())?;
                        assert_eq!(dep.state::<AState>()?.value, 2);
                        dep.commit("inc", ())?;
                        assert_eq!(dep.state::<AState>()?.value, 3);
                        checked.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                },
            );
        })
        .finish()
        .unwrap();

    let nested = module::<Value>()
        .finish()
        .unwrap()
        .child("another_counter", &b)
        .unwrap();
    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("counter", &a)
        .unwrap()
        .child("nested", &nested)
        .unwrap()
        .child("foo", &foo)
        .unwrap();
    let store = Store::new(&root).unwrap();

    assert_eq!(store.getter::<i64>(&["foo", "a_test"]).unwrap(), 2);
    assert_eq!(store.getter::<i64>(&["foo", "b_test"]).unwrap(), 2);
    store.dispatch(&["foo", "both"], ()).unwrap();
    assert_eq!(checked.load(Ordering::SeqCst), 2);
}

#[test]
fn duplicate_dependency_keys_are_rejected() {
    let a = counter();
    let b = counter();

    let foo = module::<Value>()
        .getters_with(inject("dep", &a).and("dep", &b), |g| {
            g.getter("test", |s: &GetterScope<Value>| {
                s.module("dep").state::<AState>().value
            });
        })
        .finish()
        .unwrap();

    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("foo", &foo)
        .unwrap()
        .child("a", &a)
        .unwrap()
        .child("b", &b)
        .unwrap();

    let err = match Store::new(&root) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(
        err,
        StoreError::DuplicateDependency { key } if key == "dep"
    ));
}

#[test]
fn missing_dependencies_abort_store_construction() {
    let counter = counter();

    let foo = module::<Value>()
        .getters_with(inject("counter", &counter), |g| {
            g.getter("test", |s: &GetterScope<Value>| {
                s.module("counter").state::<AState>().value
            });
        })
        .finish()
        .unwrap();

    // counter is never registered in the tree
    let err = match Store::new(&foo) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(
        err,
        StoreError::DependencyNotFound { key } if key == "counter"
    ));

    // the failed registration rolled back, so the tree is reusable once
    // the dependency is present
    let root = module::<Value>()
        .finish()
        .unwrap()
        .child("foo", &foo)
        .unwrap()
        .child("counter", &counter)
        .unwrap();
    assert!(Store::new(&root).is_ok());
}
