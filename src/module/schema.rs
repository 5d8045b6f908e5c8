//! Declarative member schemas for the three capability roles.
//!
//! A module registers its getters, mutations, and actions by name into a
//! schema while the module definition is being built. Member closures are
//! typed; the schema erases them over the JSON state plane so the store can
//! compose modules with heterogeneous state types into one tree.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::StoreError;
use crate::module::scope::{ActionScope, GetterScope, ScopeCore};

/// Marker for types usable as a module's state slice.
pub trait ModuleState: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> ModuleState for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The two getter member shapes: a derived value, or a parametric method.
/// Only derived values are memoized by the reactive adapter.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum GetterKind {
    Getter,
    Method,
}

pub(crate) type GetterRun =
    dyn Fn(&ScopeCore, &[Value]) -> Result<Value, StoreError> + Send + Sync;

pub(crate) struct GetterEntry {
    pub name: String,
    pub kind: GetterKind,
    pub run: Arc<GetterRun>,
}

pub(crate) type MutationRun =
    dyn Fn(&mut Value, &[Value]) -> Result<Option<Value>, StoreError> + Send + Sync;

pub(crate) struct MutationEntry {
    pub name: String,
    pub run: Arc<MutationRun>,
}

pub(crate) type ActionRun =
    dyn Fn(&Arc<ScopeCore>, &[Value]) -> Result<ActionReturn, StoreError> + Send + Sync;

pub(crate) struct ActionEntry {
    pub name: String,
    pub run: Arc<ActionRun>,
}

/// A pending asynchronous action result. The store hands it back to the
/// caller untouched; nothing inside the store ever awaits it.
pub type ActionFuture = futures::future::BoxFuture<'static, Value>;

/// What an action produced, before the call-time return check.
pub enum ActionReturn {
    /// The action completed synchronously with no value.
    Done,
    /// A bare value. Must be null, anything else fails the return check.
    Value(Value),
    /// A pending asynchronous result, handed back to the caller.
    Pending(ActionFuture),
}

/// Conversion from a mutation closure's return type.
///
/// Mutations must not produce a value; the check happens at call time so a
/// mutation that dynamically returns data fails loudly rather than silently
/// dropping it.
pub trait MemberReturn: 'static {
    fn into_return(self) -> Option<Value>;
}

impl MemberReturn for () {
    fn into_return(self) -> Option<Value> {
        None
    }
}

impl MemberReturn for Value {
    fn into_return(self) -> Option<Value> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

/// Conversion from an action closure's return type.
pub trait IntoActionReturn: 'static {
    fn into_action_return(self) -> Result<ActionReturn, StoreError>;
}

impl IntoActionReturn for () {
    fn into_action_return(self) -> Result<ActionReturn, StoreError> {
        Ok(ActionReturn::Done)
    }
}

impl IntoActionReturn for Value {
    fn into_action_return(self) -> Result<ActionReturn, StoreError> {
        Ok(ActionReturn::Value(self))
    }
}

impl IntoActionReturn for ActionFuture {
    fn into_action_return(self) -> Result<ActionReturn, StoreError> {
        Ok(ActionReturn::Pending(self))
    }
}

impl<T: IntoActionReturn> IntoActionReturn for Result<T, StoreError> {
    fn into_action_return(self) -> Result<ActionReturn, StoreError> {
        self?.into_action_return()
    }
}

/// Argument lists for path-addressed member calls.
///
/// Tuples of serializable values cross onto the dynamic plane; `()` means
/// no arguments, and an already-built `Vec<Value>` passes through.
pub trait IntoArgs {
    fn into_args(self) -> Result<Vec<Value>, StoreError>;
}

impl IntoArgs for () {
    fn into_args(self) -> Result<Vec<Value>, StoreError> {
        Ok(Vec::new())
    }
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Result<Vec<Value>, StoreError> {
        Ok(self)
    }
}

fn ser<T: Serialize>(value: T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialize {
        path: String::new(),
        reason: e.to_string(),
    })
}

impl<T1: Serialize> IntoArgs for (T1,) {
    fn into_args(self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![ser(self.0)?])
    }
}

impl<T1: Serialize, T2: Serialize> IntoArgs for (T1, T2) {
    fn into_args(self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![ser(self.0)?, ser(self.1)?])
    }
}

impl<T1: Serialize, T2: Serialize, T3: Serialize> IntoArgs for (T1, T2, T3) {
    fn into_args(self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![ser(self.0)?, ser(self.1)?, ser(self.2)?])
    }
}

fn expect_arity(args: &[Value], arity: usize) -> Result<(), StoreError> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(StoreError::InvalidArgs {
            path: String::new(),
            reason: format!("expected {arity} arguments, got {}", args.len()),
        })
    }
}

fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, StoreError> {
    serde_json::from_value(args[index].clone()).map_err(|e| StoreError::InvalidArgs {
        path: String::new(),
        reason: format!("argument {index}: {e}"),
    })
}

/// A mutation closure over typed state, generic over arity.
///
/// Implemented for `Fn(&mut S)` through `Fn(&mut S, A1, A2, A3)` where the
/// extra parameters deserialize from the call's argument list. The `A`
/// parameter is an inference marker; it never appears in user code.
pub trait MutationFn<S, A>: Send + Sync + 'static {
    fn apply(&self, state: &mut S, args: &[Value]) -> Result<Option<Value>, StoreError>;
}

impl<F, S, R> MutationFn<S, ((), R)> for F
where
    F: Fn(&mut S) -> R + Send + Sync + 'static,
    R: MemberReturn,
{
    fn apply(&self, state: &mut S, args: &[Value]) -> Result<Option<Value>, StoreError> {
        expect_arity(args, 0)?;
        Ok(self(state).into_return())
    }
}

impl<F, S, A1, R> MutationFn<S, ((A1,), R)> for F
where
    F: Fn(&mut S, A1) -> R + Send + Sync + 'static,
    A1: DeserializeOwned,
    R: MemberReturn,
{
    fn apply(&self, state: &mut S, args: &[Value]) -> Result<Option<Value>, StoreError> {
        expect_arity(args, 1)?;
        Ok(self(state, arg(args, 0)?).into_return())
    }
}

impl<F, S, A1, A2, R> MutationFn<S, ((A1, A2), R)> for F
where
    F: Fn(&mut S, A1, A2) -> R + Send + Sync + 'static,
    A1: DeserializeOwned,
    A2: DeserializeOwned,
    R: MemberReturn,
{
    fn apply(&self, state: &mut S, args: &[Value]) -> Result<Option<Value>, StoreError> {
        expect_arity(args, 2)?;
        Ok(self(state, arg(args, 0)?, arg(args, 1)?).into_return())
    }
}

impl<F, S, A1, A2, A3, R> MutationFn<S, ((A1, A2, A3), R)> for F
where
    F: Fn(&mut S, A1, A2, A3) -> R + Send + Sync + 'static,
    A1: DeserializeOwned,
    A2: DeserializeOwned,
    A3: DeserializeOwned,
    R: MemberReturn,
{
    fn apply(&self, state: &mut S, args: &[Value]) -> Result<Option<Value>, StoreError> {
        expect_arity(args, 3)?;
        Ok(self(state, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?).into_return())
    }
}

/// A parametric getter closure, generic over arity.
pub trait GetterMethodFn<S, A>: Send + Sync + 'static {
    fn apply(&self, scope: &GetterScope<S>, args: &[Value]) -> Result<Value, StoreError>;
}

impl<F, S, R> GetterMethodFn<S, ((), R)> for F
where
    F: Fn(&GetterScope<S>) -> R + Send + Sync + 'static,
    S: ModuleState,
    R: Serialize + 'static,
{
    fn apply(&self, scope: &GetterScope<S>, args: &[Value]) -> Result<Value, StoreError> {
        expect_arity(args, 0)?;
        ser(self(scope))
    }
}

impl<F, S, A1, R> GetterMethodFn<S, ((A1,), R)> for F
where
    F: Fn(&GetterScope<S>, A1) -> R + Send + Sync + 'static,
    S: ModuleState,
    A1: DeserializeOwned,
    R: Serialize + 'static,
{
    fn apply(&self, scope: &GetterScope<S>, args: &[Value]) -> Result<Value, StoreError> {
        expect_arity(args, 1)?;
        ser(self(scope, arg(args, 0)?))
    }
}

impl<F, S, A1, A2, R> GetterMethodFn<S, ((A1, A2), R)> for F
where
    F: Fn(&GetterScope<S>, A1, A2) -> R + Send + Sync + 'static,
    S: ModuleState,
    A1: DeserializeOwned,
    A2: DeserializeOwned,
    R: Serialize + 'static,
{
    fn apply(&self, scope: &GetterScope<S>, args: &[Value]) -> Result<Value, StoreError> {
        expect_arity(args, 2)?;
        ser(self(scope, arg(args, 0)?, arg(args, 1)?))
    }
}

/// An action closure, generic over arity.
pub trait ActionFn<S, A>: Send + Sync + 'static {
    fn apply(&self, scope: ActionScope<S>, args: &[Value]) -> Result<ActionReturn, StoreError>;
}

impl<F, S, R> ActionFn<S, ((), R)> for F
where
    F: Fn(ActionScope<S>) -> R + Send + Sync + 'static,
    S: ModuleState,
    R: IntoActionReturn,
{
    fn apply(&self, scope: ActionScope<S>, args: &[Value]) -> Result<ActionReturn, StoreError> {
        expect_arity(args, 0)?;
        self(scope).into_action_return()
    }
}

impl<F, S, A1, R> ActionFn<S, ((A1,), R)> for F
where
    F: Fn(ActionScope<S>, A1) -> R + Send + Sync + 'static,
    S: ModuleState,
    A1: DeserializeOwned,
    R: IntoActionReturn,
{
    fn apply(&self, scope: ActionScope<S>, args: &[Value]) -> Result<ActionReturn, StoreError> {
        expect_arity(args, 1)?;
        self(scope, arg(args, 0)?).into_action_return()
    }
}

impl<F, S, A1, A2, R> ActionFn<S, ((A1, A2), R)> for F
where
    F: Fn(ActionScope<S>, A1, A2) -> R + Send + Sync + 'static,
    S: ModuleState,
    A1: DeserializeOwned,
    A2: DeserializeOwned,
    R: IntoActionReturn,
{
    fn apply(&self, scope: ActionScope<S>, args: &[Value]) -> Result<ActionReturn, StoreError> {
        expect_arity(args, 2)?;
        self(scope, arg(args, 0)?, arg(args, 1)?).into_action_return()
    }
}

/// Registers a module's getters.
pub struct GetterSchema<S> {
    entries: Vec<GetterEntry>,
    error: Option<StoreError>,
    _state: PhantomData<fn() -> S>,
}

impl<S: ModuleState> GetterSchema<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            error: None,
            _state: PhantomData,
        }
    }

    /// Registers a derived value. Under the reactive adapter each getter is
    /// memoized and recomputes only when state it reads changes.
    pub fn getter<R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        R: Serialize + 'static,
        F: Fn(&GetterScope<S>) -> R + Send + Sync + 'static,
    {
        let run: Arc<GetterRun> = Arc::new(move |core, _args| {
            let scope = GetterScope::new(core.clone());
            ser(f(&scope))
        });
        self.push(name, GetterKind::Getter, run)
    }

    /// Registers a parametric getter. Methods are never memoized.
    pub fn method<A, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: GetterMethodFn<S, A>,
    {
        let run: Arc<GetterRun> = Arc::new(move |core, args| {
            let scope = GetterScope::new(core.clone());
            f.apply(&scope, args)
        });
        self.push(name, GetterKind::Method, run)
    }

    fn push(&mut self, name: &str, kind: GetterKind, run: Arc<GetterRun>) -> &mut Self {
        if self.entries.iter().any(|e| e.name == name) {
            if self.error.is_none() {
                self.error = Some(StoreError::DuplicateMember {
                    name: name.to_string(),
                });
            }
        } else {
            self.entries.push(GetterEntry {
                name: name.to_string(),
                kind,
                run,
            });
        }
        self
    }

    pub(crate) fn finish(self) -> Result<Vec<GetterEntry>, StoreError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.entries),
        }
    }
}

/// Registers a module's mutations.
///
/// Mutation closures see nothing but their own state slice. Cross-module
/// handles are deliberately unavailable here, which keeps mutation side
/// effects local and auditable.
pub struct MutationSchema<S> {
    entries: Vec<MutationEntry>,
    error: Option<StoreError>,
    _state: PhantomData<fn() -> S>,
}

impl<S: ModuleState> MutationSchema<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            error: None,
            _state: PhantomData,
        }
    }

    pub fn mutation<A, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: MutationFn<S, A>,
    {
        let run: Arc<MutationRun> = Arc::new(move |slot, args| {
            let mut state: S =
                serde_json::from_value(slot.clone()).map_err(|e| StoreError::StateShapeMismatch {
                    path: String::new(),
                    reason: e.to_string(),
                })?;
            let returned = f.apply(&mut state, args)?;
            *slot = serde_json::to_value(&state).map_err(|e| StoreError::Serialize {
                path: String::new(),
                reason: e.to_string(),
            })?;
            Ok(returned)
        });
        if self.entries.iter().any(|e| e.name == name) {
            if self.error.is_none() {
                self.error = Some(StoreError::DuplicateMember {
                    name: name.to_string(),
                });
            }
        } else {
            self.entries.push(MutationEntry {
                name: name.to_string(),
                run,
            });
        }
        self
    }

    pub(crate) fn finish(self) -> Result<Vec<MutationEntry>, StoreError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.entries),
        }
    }
}

/// Registers a module's actions.
pub struct ActionSchema<S> {
    entries: Vec<ActionEntry>,
    error: Option<StoreError>,
    _state: PhantomData<fn() -> S>,
}

impl<S: ModuleState> ActionSchema<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            error: None,
            _state: PhantomData,
        }
    }

    pub fn action<A, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: ActionFn<S, A>,
    {
        let run: Arc<ActionRun> = Arc::new(move |core: &Arc<ScopeCore>, args| {
            let scope = ActionScope::new(core.clone());
            f.apply(scope, args)
        });
        if self.entries.iter().any(|e| e.name == name) {
            if self.error.is_none() {
                self.error = Some(StoreError::DuplicateMember {
                    name: name.to_string(),
                });
            }
        } else {
            self.entries.push(ActionEntry {
                name: name.to_string(),
                run,
            });
        }
        self
    }

    pub(crate) fn finish(self) -> Result<Vec<ActionEntry>, StoreError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.entries),
        }
    }
}
