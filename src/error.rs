use thiserror::Error;

/// Every failure the store can produce.
///
/// Construction-time structural errors (duplicate keys, duplicate
/// registration, missing dependencies) abort store setup entirely; call-time
/// contract errors (mutation/action return discipline, bad arguments) abort
/// only the offending call and leave the store usable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A child key was reused within one module definition.
    #[error("`{key}` is already used in the module")]
    DuplicateChildKey { key: String },

    /// A member name was registered twice in one schema.
    #[error("member `{name}` is already defined")]
    DuplicateMember { name: String },

    /// A dependency key was declared twice in one injection list.
    #[error("dependency key `{key}` is declared twice")]
    DuplicateDependency { key: String },

    /// The same module definition was placed twice in one tree, or
    /// registered into a second live store.
    #[error("the module is already registered; a module definition must not be reused")]
    DuplicateRegistration { uid: u64 },

    /// A capability object's own module has no proxy in the store.
    #[error("the module proxy is not found in the store")]
    ProxyNotFound,

    /// An injected dependency was never registered in the same store.
    #[error("the dependent module `{key}` is not found in the store")]
    DependencyNotFound { key: String },

    /// A mutation produced a value. Mutations mutate state and nothing else.
    #[error("mutation `{path}` must not return a value")]
    MutationsMustNotReturn { path: String },

    /// An action produced a bare value that is neither nothing nor a future.
    #[error("action `{path}` must return nothing or a future")]
    ActionsInvalidReturn { path: String },

    /// A module owns child modules but its state does not serialize to an
    /// object, so the children have nowhere to nest.
    #[error("module `{path}` owns child modules but its state is not an object")]
    InvalidStateShape { path: String },

    /// No module exists at the addressed path.
    #[error("no module at `{path}`")]
    PathNotFound { path: String },

    /// No member with the addressed name exists on the module.
    #[error("no member `{path}` in the store")]
    MemberNotFound { path: String },

    /// The argument list could not be deserialized for the member.
    #[error("invalid arguments for `{path}`: {reason}")]
    InvalidArgs { path: String, reason: String },

    /// The state subtree does not match the module's declared state type.
    #[error("state at `{path}` does not match the module state type: {reason}")]
    StateShapeMismatch { path: String, reason: String },

    /// A value could not be serialized onto the state plane.
    #[error("failed to serialize value for `{path}`: {reason}")]
    Serialize { path: String, reason: String },

    /// A proxy outlived the store it belongs to.
    #[error("the owning store has been dropped")]
    StoreDetached,

    /// State changed outside a mutation while strict mode is enabled.
    /// Raised as a panic from the state observer, which has no error
    /// return channel.
    #[error("must not update state outside of mutations when strict mode is enabled")]
    IllegalStateMutation,
}

impl StoreError {
    /// Fills in the path of a path-carrying error raised somewhere the full
    /// member path was not yet known.
    pub(crate) fn located(self, at: &str) -> Self {
        match self {
            StoreError::InvalidArgs { path, reason } if path.is_empty() => {
                StoreError::InvalidArgs { path: at.to_string(), reason }
            }
            StoreError::StateShapeMismatch { path, reason } if path.is_empty() => {
                StoreError::StateShapeMismatch { path: at.to_string(), reason }
            }
            StoreError::Serialize { path, reason } if path.is_empty() => {
                StoreError::Serialize { path: at.to_string(), reason }
            }
            StoreError::InvalidStateShape { path } if path.is_empty() => {
                StoreError::InvalidStateShape { path: at.to_string() }
            }
            other => other,
        }
    }
}
