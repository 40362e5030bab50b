//! Binding entity and change propagation
//!
//! One [`Binding`] per bound `(target, target_key)` pair. Identity fields are
//! immutable after creation; propagation mutates only the `propagating` guard.
//! Endpoints are held as `Weak` so a binding never extends an object's
//! lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::TetherError;
use crate::observable::{Observable, ObjectId, SubscriptionId};

/// Binding direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source drives target only
    OneWay,
    /// Either endpoint drives the other (echo-suppressed)
    TwoWay,
}

/// Which endpoint fired the change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Source,
    Target,
}

/// Outcome of one propagation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Propagation {
    /// Value copied to the opposite endpoint
    Delivered,
    /// Echo of a copy this binding initiated; dropped at the guard
    Suppressed,
    /// Opposite endpoint already destroyed; caller should purge the binding
    DeadEndpoint,
}

/// One active binding relationship
pub struct Binding {
    target: Weak<dyn Observable>,
    target_id: ObjectId,
    target_key: Arc<str>,
    source: Weak<dyn Observable>,
    source_id: ObjectId,
    source_key: Arc<str>,
    direction: Direction,
    /// True only while a value copy initiated by this binding is in flight
    propagating: AtomicBool,
    /// Recorded after registration so teardown can cancel them
    source_sub: OnceCell<SubscriptionId>,
    target_sub: OnceCell<SubscriptionId>,
}

/// Clears the propagation guard on every exit path, including a failed write
struct ClearGuard<'a>(&'a AtomicBool);

impl Drop for ClearGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Binding {
    pub(crate) fn new(
        target: &Arc<dyn Observable>,
        target_key: &str,
        source: &Arc<dyn Observable>,
        source_key: &str,
        direction: Direction,
    ) -> Self {
        Self {
            target: Arc::downgrade(target),
            target_id: ObjectId::of(target),
            target_key: Arc::from(target_key),
            source: Arc::downgrade(source),
            source_id: ObjectId::of(source),
            source_key: Arc::from(source_key),
            direction,
            propagating: AtomicBool::new(false),
            source_sub: OnceCell::new(),
            target_sub: OnceCell::new(),
        }
    }

    pub fn target_id(&self) -> ObjectId {
        self.target_id
    }

    pub fn target_key(&self) -> &Arc<str> {
        &self.target_key
    }

    pub fn source_id(&self) -> ObjectId {
        self.source_id
    }

    pub fn source_key(&self) -> &Arc<str> {
        &self.source_key
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn record_source_sub(&self, sub: SubscriptionId) {
        let _ = self.source_sub.set(sub);
    }

    pub(crate) fn record_target_sub(&self, sub: SubscriptionId) {
        let _ = self.target_sub.set(sub);
    }

    pub(crate) fn source_sub(&self) -> Option<SubscriptionId> {
        self.source_sub.get().copied()
    }

    pub(crate) fn target_sub(&self) -> Option<SubscriptionId> {
        self.target_sub.get().copied()
    }

    pub(crate) fn upgrade_source(&self) -> Option<Arc<dyn Observable>> {
        self.source.upgrade()
    }

    pub(crate) fn upgrade_target(&self) -> Option<Arc<dyn Observable>> {
        self.target.upgrade()
    }

    /// Copy a changed value to the opposite endpoint.
    ///
    /// A change arriving while this binding is already propagating is the
    /// two-way echo of our own write and is suppressed. A write failure at
    /// the destination propagates to the caller, with the guard cleared
    /// regardless.
    pub(crate) fn propagate_from(
        &self,
        origin: Origin,
        value: &Value,
    ) -> Result<Propagation, TetherError> {
        if self.propagating.swap(true, Ordering::Acquire) {
            return Ok(Propagation::Suppressed);
        }
        let _clear = ClearGuard(&self.propagating);

        let (dest, dest_key) = match origin {
            Origin::Source => (&self.target, &self.target_key),
            Origin::Target => (&self.source, &self.source_key),
        };

        match dest.upgrade() {
            Some(obj) => {
                obj.set(dest_key, value.clone())?;
                Ok(Propagation::Delivered)
            }
            None => {
                warn!(
                    key_path = %dest_key,
                    "binding endpoint destroyed without unbind; dropping change"
                );
                Ok(Propagation::DeadEndpoint)
            }
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("target_id", &self.target_id)
            .field("target_key", &self.target_key)
            .field("source_id", &self.source_id)
            .field("source_key", &self.source_key)
            .field("direction", &self.direction)
            .finish()
    }
}
