use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use serde::{Deserialize, Serialize};
use stratum::{
    create_store, module, GetterScope, Memo, ModuleDefinition, Signal, Store, StoreOptions,
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
        .finish()
        .unwrap()
}

fn signal_read_benchmark(c: &mut Criterion) {
    let signal: Signal<i32> = Signal::new(42);

    c.bench_function("signal_read", |b| {
        b.iter(|| {
            black_box(signal.get());
        });
    });
}

fn signal_write_benchmark(c: &mut Criterion) {
    let signal: Signal<i32> = Signal::new(0);

    c.bench_function("signal_write", |b| {
        let mut i = 0;
        b.iter(|| {
            signal.set(black_box(i));
            i += 1;
        });
    });
}

fn memo_computation_benchmark(c: &mut Criterion) {
    let a: Signal<i32> = Signal::new(5);
    let b: Signal<i32> = Signal::new(10);

    let sum = Memo::new({
        let a = a.clone();
        let b = b.clone();
        move || a.get() + b.get()
    });

    c.bench_function("memo_computation", |bench| {
        bench.iter(|| {
            black_box(sum.get());
        });
    });
}

fn store_mutation_benchmark(c: &mut Criterion) {
    let store = Store::new(&counter()).unwrap();

    c.bench_function("store_mutation", |b| {
        b.iter(|| {
            store.mutate(black_box(&["inc"]), (1i64,)).unwrap();
        });
    });
}

fn reactive_getter_benchmark(c: &mut Criterion) {
    let store = create_store(&counter(), StoreOptions::default()).unwrap();
    store.mutate(&["inc"], (21i64,)).unwrap();

    c.bench_function("memoized_getter_read", |b| {
        b.iter(|| {
            black_box(store.getter::<i64>(&["doubled"]).unwrap());
        });
    });
}

criterion_group!(
    benches,
    signal_read_benchmark,
    signal_write_benchmark,
    memo_computation_benchmark,
    store_mutation_benchmark,
    reactive_getter_benchmark
);
criterion_main!(benches);
