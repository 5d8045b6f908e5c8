//! Module definitions, capability schemas, scopes, and injection.
//!
//! A module owns a slice of state plus getters, mutations, and actions.
//! Modules compose into a tree with [`ModuleDefinition::child`] and the
//! tree is handed to a store, which instantiates every member bound
//! through a path-resolving [`ModuleProxy`].

mod definition;
mod inject;
mod proxy;
mod schema;
mod scope;

pub use definition::{module, ModuleBuilder, ModuleDefinition};
pub use inject::{inject, Injected};
pub use proxy::ModuleProxy;
pub use schema::{
    ActionFn, ActionFuture, ActionReturn, ActionSchema, GetterMethodFn, GetterSchema,
    IntoActionReturn, IntoArgs, MemberReturn, ModuleState, MutationFn, MutationSchema,
};
pub use scope::{ActionScope, GetterScope, ModuleHandle, ModuleView};

pub(crate) use schema::{ActionEntry, GetterEntry, GetterKind, MutationEntry};
pub(crate) use scope::ScopeCore;
