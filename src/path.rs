//! Path resolution over the state plane and process-wide identity counters.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Next module definition identity. Identities are process-unique and never
/// reused, which is what makes the duplicate-registration guard reliable.
pub(crate) fn next_module_id() -> u64 {
    static IDS: AtomicU64 = AtomicU64::new(1);
    IDS.fetch_add(1, Ordering::Relaxed)
}

/// Next store identity, used by the attach guard on module definitions.
pub(crate) fn next_store_id() -> u64 {
    static IDS: AtomicU64 = AtomicU64::new(1);
    IDS.fetch_add(1, Ordering::Relaxed)
}

/// Joins a path with dots, the form subscribers and devtools see.
pub(crate) fn join<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolves `path` against a nested object tree.
pub(crate) fn get_by_path<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter().try_fold(root, |acc, key| acc.get(key.as_ref()))
}

/// Mutable variant of [`get_by_path`].
pub(crate) fn get_by_path_mut<'a, S: AsRef<str>>(
    root: &'a mut Value,
    path: &[S],
) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(root, |acc, key| acc.get_mut(key.as_ref()))
}
