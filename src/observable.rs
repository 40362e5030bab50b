//! Observation capability - the seam between the registry and bindable objects
//!
//! The registry never depends on concrete object types. Anything that can
//! read/write named properties and fire synchronous change notifications
//! implements [`Observable`] and becomes bindable.

use std::sync::Arc;

use serde_json::Value;

use crate::binding::Direction;
use crate::error::TetherError;
use crate::registry::Registry;

/// Observer callback invoked synchronously when an observed key path changes.
///
/// Returning an error surfaces it to the caller that performed the write
/// (used by two-way bindings to report a failed mirror write).
pub type ObserverFn = Arc<dyn Fn(&Value) -> Result<(), TetherError> + Send + Sync>;

/// Handle for a registered observer, used to cancel it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Construct from a raw counter value (for `Observable` implementors)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stable identity of a bindable object.
///
/// Derived from the `Arc` data pointer, so it never keeps the object alive
/// and stays valid as a lookup key even after the object is dropped.
///
/// The allocator may hand a dropped endpoint's address to a new object, at
/// which point a stale, never-purged binding aliases the newcomer in lookups
/// like [`crate::Registry::is_bound`]. Hosts that destroy endpoints should
/// tear their bindings down first via [`crate::Registry::unbind_on_drop`] or
/// [`crate::Registry::purge`]; stale entries are otherwise only removed
/// lazily, at their next propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Identity of the object behind an `Arc<dyn Observable>`
    pub fn of(obj: &Arc<dyn Observable>) -> Self {
        Self(Arc::as_ptr(obj) as *const () as usize)
    }
}

/// Capability trait for bindable objects: named property access plus
/// synchronous change observation.
///
/// `set` must notify every observer registered on the written key path before
/// returning, and must return the first observer error to its caller.
pub trait Observable: Send + Sync {
    /// Read the value at a key path
    fn get(&self, key_path: &str) -> Result<Value, TetherError>;

    /// Write the value at a key path, notifying observers synchronously
    fn set(&self, key_path: &str, value: Value) -> Result<(), TetherError>;

    /// Register an observer for changes to a key path
    fn observe(&self, key_path: &str, observer: ObserverFn) -> Result<SubscriptionId, TetherError>;

    /// Cancel a previously registered observer (no-op for unknown handles)
    fn unobserve(&self, subscription: SubscriptionId);
}

/// Validate key path syntax: non-empty, no empty dot-separated segments
pub fn validate_key_path(path: &str) -> Result<(), TetherError> {
    if path.is_empty() || path.split('.').any(|segment| segment.is_empty()) {
        return Err(TetherError::InvalidKeyPath {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Per-object convenience surface over the global [`Registry`]
///
/// Pure delegation with the receiver fixed as the binding target; carries no
/// state of its own.
pub trait ObservableExt {
    /// Bind my `key_path` to `source.source_key`
    fn bind_key_path(
        &self,
        key_path: &str,
        source: &Arc<dyn Observable>,
        source_key: &str,
        direction: Direction,
    ) -> Result<(), TetherError>;

    /// Unbind my `key_path` (no-op if unbound)
    fn unbind_key_path(&self, key_path: &str);

    /// Unbind every binding I participate in, as target or source
    fn unbind_all_key_paths(&self);
}

impl ObservableExt for Arc<dyn Observable> {
    fn bind_key_path(
        &self,
        key_path: &str,
        source: &Arc<dyn Observable>,
        source_key: &str,
        direction: Direction,
    ) -> Result<(), TetherError> {
        Registry::global().bind(self, key_path, source, source_key, direction)
    }

    fn unbind_key_path(&self, key_path: &str) {
        Registry::global().unbind(self, key_path);
    }

    fn unbind_all_key_paths(&self) {
        Registry::global().unbind_all(self);
    }
}
