//! The bare store runtime: module registration, aggregate trees, mutation
//! notification, and hot swapping.

mod store;

pub use store::{Store, SubscriberFn, Subscription};

pub(crate) use store::{
    GetterHook, GetterMember, Hooks, MutationHook, MutationMember, StateCell, StoreCore,
};
