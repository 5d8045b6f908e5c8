use serde::{Deserialize, Serialize};
use serde_json::json;
use stratum::{create_store, module, ActionScope, GetterScope, ModuleDefinition, Store, StoreOptions};

#[derive(Serialize, Deserialize, Default)]
struct FooState { value: i64 }

fn mutation_module(num: i64) -> ModuleDefinition {
    module::<FooState>()
        .state(|| FooState { value: 1 })
        .mutations(move |m| {
            m.mutation("inc", move |state: &mut FooState| state.value += num);
        })
        .finish()
        .unwrap()
}

fn tree(make: &dyn Fn(i64) -> ModuleDefinition, nums: [i64; 4]) -> ModuleDefinition {
    let b = make(nums[2]);
    let a = make(nums[1]).child("b", &b).unwrap();
    let c = make(nums[3]);
    make(nums[0]).child("a", &a).unwrap().child("c", &c).unwrap()
}

fn main() {
    let store = create_store(&tree(&mutation_module, [1,2,3,4]), StoreOptions::default()).unwrap();
    println!("state = {}", store.state());
    let r = store.mutate(&["a", "inc"], ());
    println!("{:?}", r.is_ok());
}
