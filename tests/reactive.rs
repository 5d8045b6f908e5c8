//! The reactive adapter: memoization, watch, strict mode, plugins, and the
//! devtool bridge.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stratum::devtools::{devtool_plugin, DevtoolBridge, DevtoolHandle, MutationRecord};
use stratum::reactive::{Derived, ReactiveCell, ReactiveEngine, WatchCallback, WatchSource};
use stratum::{
    create_store, module, GetterScope, ModuleDefinition, SignalEngine, StoreOptions, Subscription,
    WatchOptions,
};

#[derive(Serialize, Deserialize, Default)]
struct CounterState {
    count: i64,
}

fn counter_with_probe(computations: Arc<AtomicUsize>) -> ModuleDefinition {
    module::<CounterState>()
        .state(CounterState::default)
        .getters(move |g| {
            let computations = computations.clone();
            g.getter("doubled", move |s: &GetterScope<CounterState>| {
                computations.fetch_add(1, Ordering::SeqCst);
                s.state().count * 2
            });
        })
        .mutations(|m| {
            m.mutation("inc", |state: &mut CounterState, n: i64| state.count += n);
        })
        .finish()
        .unwrap()
}

#[test]
fn getters_are_memoized_until_state_changes() {
    let computations = Arc::new(AtomicUsize::new(0));
    let store = create_store(
        &counter_with_probe(computations.clone()),
        StoreOptions::default(),
    )
    .unwrap();

    assert_eq!(store.getter::<i64>(&["doubled"]).unwrap(), 0);
    assert_eq!(store.getter::<i64>(&["doubled"]).unwrap(), 0);
    assert_eq!(computations.load(Ordering::SeqCst), 1);

    store.mutate(&["inc"], (3,)).unwrap();
    assert_eq!(store.getter::<i64>(&["doubled"]).unwrap(), 6);
    assert_eq!(store.getter::<i64>(&["doubled"]).unwrap(), 6);
    assert_eq!(computations.load(Ordering::SeqCst), 2);
}

#[test]
fn getter_chains_memoize_through_self_reference() {
    #[derive(Serialize, Deserialize)]
    struct S {
        value: String,
    }

    let computations = Arc::new(AtomicUsize::new(0));
    let probe = computations.clone();
    let m = module::<S>()
        .state(|| S {
            value: "foo".into(),
        })
        .getters(move |g| {
            let probe = probe.clone();
            g.getter("double", |s: &GetterScope<S>| {
                let v = s.state().value;
                format!("{v}{v}")
            });
            g.getter("double_upper", move |s: &GetterScope<S>| {
                probe.fetch_add(1, Ordering::SeqCst);
                s.get::<String>("double").to_uppercase()
            });
        })
        .mutations(|m| {
            m.mutation("set", |state: &mut S, v: String| state.value = v);
        })
        .finish()
        .unwrap();

    let store = create_store(&m, StoreOptions::default()).unwrap();
    assert_eq!(
        store.getter::<String>(&["double_upper"]).unwrap(),
        "FOOFOO"
    );
    assert_eq!(
        store.getter::<String>(&["double_upper"]).unwrap(),
        "FOOFOO"
    );
    assert_eq!(computations.load(Ordering::SeqCst), 1);

    store.mutate(&["set"], ("bar",)).unwrap();
    assert_eq!(
        store.getter::<String>(&["double_upper"]).unwrap(),
        "BARBAR"
    );
    assert_eq!(computations.load(Ordering::SeqCst), 2);
}

#[test]
fn watch_observes_selected_values() {
    let computations = Arc::new(AtomicUsize::new(0));
    let store = create_store(&counter_with_probe(computations), StoreOptions::default()).unwrap();

    let seen: Arc<Mutex<Vec<(i64, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let watch = store.watch(
        |_state, getters| getters.raw(&["doubled"]),
        {
            let seen = seen.clone();
            move |new, old| {
                seen.lock()
                    .unwrap()
                    .push((new.as_i64().unwrap(), old.as_i64().unwrap()));
            }
        },
        WatchOptions::default(),
    );

    store.mutate(&["inc"], (2,)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(4, 0)]);

    // unchanged selector output stays silent
    store.mutate(&["inc"], (0,)).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);

    watch.unsubscribe();
    store.mutate(&["inc"], (1,)).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn watch_immediate_fires_with_the_current_value() {
    let store = create_store(
        &counter_with_probe(Arc::new(AtomicUsize::new(0))),
        StoreOptions::default(),
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _watch = store.watch(
        |state, _getters| state["count"].clone(),
        {
            let seen = seen.clone();
            move |new, _old| seen.lock().unwrap().push(new.clone())
        },
        WatchOptions { immediate: true },
    );

    assert_eq!(*seen.lock().unwrap(), vec![json!(0)]);
}

/// Delegating engine that leaks its state cell, standing in for a host
/// whose reactive container is reachable outside the store.
struct LeakyEngine {
    inner: SignalEngine,
    cells: Mutex<Vec<Arc<dyn ReactiveCell>>>,
}

impl LeakyEngine {
    fn new() -> Self {
        Self {
            inner: SignalEngine::new(),
            cells: Mutex::new(Vec::new()),
        }
    }
}

impl ReactiveEngine for LeakyEngine {
    fn cell(&self, initial: Value) -> Arc<dyn ReactiveCell> {
        let cell = self.inner.cell(initial);
        self.cells.lock().unwrap().push(cell.clone());
        cell
    }

    fn derived(&self, compute: Box<dyn Fn() -> Value + Send + Sync>) -> Arc<dyn Derived> {
        self.inner.derived(compute)
    }

    fn observe(
        &self,
        source: WatchSource,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> Subscription {
        self.inner.observe(source, callback, options)
    }
}

#[test]
#[should_panic(expected = "must not update state outside of mutations")]
fn strict_mode_panics_on_out_of_band_writes() {
    let engine = Arc::new(LeakyEngine::new());
    let store = create_store(
        &counter_with_probe(Arc::new(AtomicUsize::new(0))),
        StoreOptions {
            strict: true,
            plugins: Vec::new(),
            engine: Some(engine.clone()),
        },
    )
    .unwrap();
    assert!(store.is_strict());

    let cell = engine.cells.lock().unwrap()[0].clone();
    // writing the reactive container behind the store's back
    cell.set(json!({ "count": 99 }));
}

#[test]
fn strict_mode_allows_mutations_and_replace_state() {
    let store = create_store(
        &counter_with_probe(Arc::new(AtomicUsize::new(0))),
        StoreOptions {
            strict: true,
            plugins: Vec::new(),
            engine: None,
        },
    )
    .unwrap();

    store.mutate(&["inc"], (2,)).unwrap();
    assert_eq!(store.state()["count"], 2);

    store.replace_state(json!({ "count": 10 }));
    assert_eq!(store.state()["count"], 10);

    store.hot_update(&counter_with_probe(Arc::new(AtomicUsize::new(0)))).unwrap();
    assert_eq!(store.state()["count"], 10);
}

#[derive(Default)]
struct RecordingBridge {
    handle: Mutex<Option<DevtoolHandle>>,
    init: Mutex<Option<(Value, BTreeMap<String, Value>)>>,
    mutations: Mutex<Vec<MutationRecord>>,
}

impl DevtoolBridge for RecordingBridge {
    fn connected(&self, handle: DevtoolHandle) {
        *self.handle.lock().unwrap() = Some(handle);
    }

    fn init(&self, state: Value, getters: BTreeMap<String, Value>) {
        *self.init.lock().unwrap() = Some((state, getters));
    }

    fn mutation(&self, record: MutationRecord) {
        self.mutations.lock().unwrap().push(record);
    }
}

#[test]
fn devtool_bridge_mirrors_the_store() {
    let bridge = Arc::new(RecordingBridge::default());
    let store = create_store(
        &counter_with_probe(Arc::new(AtomicUsize::new(0))),
        StoreOptions {
            strict: false,
            plugins: vec![devtool_plugin(bridge.clone())],
            engine: None,
        },
    )
    .unwrap();

    // init snapshot with flattened getters
    let (state, getters) = bridge.init.lock().unwrap().clone().unwrap();
    assert_eq!(state["count"], 0);
    assert_eq!(getters.get("doubled"), Some(&json!(0)));

    // mutation mirroring with dot-joined paths
    store.mutate(&["inc"], (2,)).unwrap();
    {
        let mutations = bridge.mutations.lock().unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].kind, "inc");
        assert_eq!(mutations[0].payload, vec![json!(2)]);
        assert_eq!(mutations[0].state["count"], 2);
    }

    // time travel through the handle
    let handle = bridge.handle.lock().unwrap().clone().unwrap();
    handle.travel_to(json!({ "count": 0 }));
    assert_eq!(store.state()["count"], 0);
    assert_eq!(handle.getters().get("doubled"), Some(&json!(0)));
}

#[test]
fn plugins_run_once_with_the_assembled_store() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_probe = runs.clone();
    let _store = create_store(
        &counter_with_probe(Arc::new(AtomicUsize::new(0))),
        StoreOptions {
            strict: false,
            plugins: vec![Box::new(move |store| {
                assert_eq!(store.state()["count"], 0);
                runs_probe.fetch_add(1, Ordering::SeqCst);
            })],
            engine: None,
        },
    )
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
