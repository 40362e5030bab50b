//! Binding registry - creates, stores, looks up and tears down bindings
//!
//! Two lookup tables:
//! - `(target, target_key) → Binding` for unbind-by-key-path
//! - `owner → bindings` indexing **both** endpoints, for bulk teardown
//!
//! The registry holds endpoints weakly and owns only the `Binding` entries.
//! A process-wide instance backs the per-object convenience surface; tests
//! construct isolated instances with [`Registry::new`].

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

use crate::binding::{Binding, Direction, Origin, Propagation};
use crate::error::TetherError;
use crate::observable::{validate_key_path, Observable, ObjectId};

/// Global registry instance (backs `ObservableExt`)
static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Binding registry; cheap to clone, clones share state
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// (target, target_key) → binding
    by_key: DashMap<(ObjectId, Arc<str>), Arc<Binding>>,
    /// owner → every binding the owner participates in, as target or source
    by_owner: DashMap<ObjectId, Vec<Arc<Binding>>>,
}

impl Inner {
    fn is_registered(&self, binding: &Arc<Binding>) -> bool {
        self.by_key
            .get(&(binding.target_id(), Arc::clone(binding.target_key())))
            .map(|current| Arc::ptr_eq(current.value(), binding))
            .unwrap_or(false)
    }

    fn index_owner(&self, id: ObjectId, binding: &Arc<Binding>) {
        self.by_owner.entry(id).or_default().push(Arc::clone(binding));
    }

    fn unindex_owner(&self, id: ObjectId, binding: &Arc<Binding>) {
        let emptied = match self.by_owner.get_mut(&id) {
            Some(mut list) => {
                list.retain(|b| !Arc::ptr_eq(b, binding));
                list.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_owner.remove_if(&id, |_, list| list.is_empty());
        }
    }

    /// Cancel subscriptions on surviving endpoints and drop from both maps
    fn remove(&self, binding: &Arc<Binding>) {
        let key = (binding.target_id(), Arc::clone(binding.target_key()));
        self.by_key.remove_if(&key, |_, current| Arc::ptr_eq(current, binding));

        self.unindex_owner(binding.target_id(), binding);
        if binding.source_id() != binding.target_id() {
            self.unindex_owner(binding.source_id(), binding);
        }

        if let (Some(source), Some(sub)) = (binding.upgrade_source(), binding.source_sub()) {
            source.unobserve(sub);
        }
        if let (Some(target), Some(sub)) = (binding.upgrade_target(), binding.target_sub()) {
            target.unobserve(sub);
        }
    }
}

/// Observer callback body shared by both binding directions
fn forward(
    inner: &Weak<Inner>,
    binding: &Arc<Binding>,
    origin: Origin,
    value: &Value,
) -> Result<(), TetherError> {
    let Some(inner) = inner.upgrade() else {
        return Ok(());
    };
    // A notification can already be in flight when unbind removes the pair;
    // an unregistered binding never propagates
    if !inner.is_registered(binding) {
        return Ok(());
    }
    match binding.propagate_from(origin, value)? {
        Propagation::DeadEndpoint => {
            // Lazy purge: the opposite endpoint died without unbind
            inner.remove(binding);
            Ok(())
        }
        Propagation::Delivered | Propagation::Suppressed => Ok(()),
    }
}

impl Registry {
    /// Isolated registry instance
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Bind `target.target_key` to mirror `source.source_key`.
    ///
    /// Replaces any existing binding for `(target, target_key)`, then:
    /// 1. synchronously copies the current source value to the target,
    /// 2. observes `source.source_key`,
    /// 3. for [`Direction::TwoWay`], also observes `target.target_key`.
    ///
    /// Atomic: on any failure no binding is stored and no subscription stays
    /// registered. The replaced binding is not resurrected on failure; the
    /// pair ends up unbound.
    pub fn bind(
        &self,
        target: &Arc<dyn Observable>,
        target_key: &str,
        source: &Arc<dyn Observable>,
        source_key: &str,
        direction: Direction,
    ) -> Result<(), TetherError> {
        validate_key_path(target_key)?;
        validate_key_path(source_key)?;

        let target_id = ObjectId::of(target);
        let source_id = ObjectId::of(source);
        if target_id == source_id && target_key == source_key {
            return Err(TetherError::SelfBinding {
                key_path: target_key.to_string(),
            });
        }

        // No stacked bindings for the same pair
        self.unbind_by_id(target_id, target_key);

        // Initial sync, before any observer exists: the target reflects the
        // source the instant bind returns
        let initial = source.get(source_key)?;
        target.set(target_key, initial)?;

        let binding = Arc::new(Binding::new(target, target_key, source, source_key, direction));

        let inner_ref = Arc::downgrade(&self.inner);
        let forward_binding = Arc::clone(&binding);
        let sub = source.observe(
            source_key,
            Arc::new(move |value| forward(&inner_ref, &forward_binding, Origin::Source, value)),
        )?;
        binding.record_source_sub(sub);

        if direction == Direction::TwoWay {
            let inner_ref = Arc::downgrade(&self.inner);
            let forward_binding = Arc::clone(&binding);
            let result = target.observe(
                target_key,
                Arc::new(move |value| forward(&inner_ref, &forward_binding, Origin::Target, value)),
            );
            match result {
                Ok(sub) => binding.record_target_sub(sub),
                Err(err) => {
                    // Roll back the source-side observer; nothing was stored
                    if let Some(sub) = binding.source_sub() {
                        source.unobserve(sub);
                    }
                    return Err(err);
                }
            }
        }

        self.inner
            .by_key
            .insert((target_id, Arc::clone(binding.target_key())), Arc::clone(&binding));
        self.inner.index_owner(target_id, &binding);
        if source_id != target_id {
            self.inner.index_owner(source_id, &binding);
        }

        debug!(
            target_id = ?target_id,
            target_key,
            source_id = ?source_id,
            source_key,
            direction = ?direction,
            "binding registered"
        );
        Ok(())
    }

    /// Remove the binding for `(obj, key_path)`; no-op when unbound
    pub fn unbind(&self, obj: &Arc<dyn Observable>, key_path: &str) {
        self.unbind_by_id(ObjectId::of(obj), key_path);
    }

    /// Remove every binding `obj` participates in, as target or source
    pub fn unbind_all(&self, obj: &Arc<dyn Observable>) {
        self.purge(ObjectId::of(obj));
    }

    /// Destruction hook: purge by raw identity, callable while the object
    /// itself is being dropped
    pub fn purge(&self, id: ObjectId) {
        let bindings = match self.inner.by_owner.remove(&id) {
            Some((_, list)) => list,
            None => return,
        };
        for binding in &bindings {
            self.inner.remove(binding);
        }
        debug!(owner = ?id, count = bindings.len(), "purged bindings");
    }

    /// RAII destruction hook: purges all of `obj`'s bindings on drop
    pub fn unbind_on_drop(&self, obj: &Arc<dyn Observable>) -> UnbindGuard {
        UnbindGuard {
            registry: self.clone(),
            id: ObjectId::of(obj),
        }
    }

    /// Whether a binding exists for `(obj, key_path)`
    pub fn is_bound(&self, obj: &Arc<dyn Observable>, key_path: &str) -> bool {
        self.inner
            .by_key
            .contains_key(&(ObjectId::of(obj), Arc::<str>::from(key_path)))
    }

    /// Number of active bindings
    pub fn len(&self) -> usize {
        self.inner.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.by_key.is_empty()
    }

    fn unbind_by_id(&self, id: ObjectId, key_path: &str) {
        let key = (id, Arc::<str>::from(key_path));
        if let Some((_, binding)) = self.inner.by_key.remove(&key) {
            self.inner.remove(&binding);
            debug!(owner = ?id, key_path, "binding removed");
        }
    }
}

/// Purges every binding of one object when dropped
pub struct UnbindGuard {
    registry: Registry,
    id: ObjectId,
}

impl Drop for UnbindGuard {
    fn drop(&mut self) {
        self.registry.purge(self.id);
    }
}
