//! Binding registry integration tests
//!
//! Covers the observable guarantees of the binding system:
//! 1. Initial sync on bind
//! 2. One-way forwarding
//! 3. Two-way forwarding without echo (exactly one write per external change)
//! 4. Rebind replaces the previous binding
//! 5. Unbind stops propagation
//! 6. Unbind-all tears down target and source roles
//! 7. Safety when an endpoint is destroyed without unbind
//!
//! Every test uses an isolated Registry, never the global one, except the
//! convenience-surface test which exercises the global on its own objects.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tether::{
    Direction, Observable, ObservableExt, ObserverFn, PropertyMap, Registry, SubscriptionId,
    TetherError,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Install the log subscriber once (RUST_LOG=tether=debug to see propagation)
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn observable() -> Arc<dyn Observable> {
    init_tracing();
    Arc::new(PropertyMap::new())
}

/// Counts underlying write-primitive invocations, for echo detection
struct CountingMap {
    inner: PropertyMap,
    sets: AtomicUsize,
}

impl CountingMap {
    fn new() -> Self {
        Self {
            inner: PropertyMap::new(),
            sets: AtomicUsize::new(0),
        }
    }

    fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl Observable for CountingMap {
    fn get(&self, key_path: &str) -> Result<Value, TetherError> {
        self.inner.get(key_path)
    }

    fn set(&self, key_path: &str, value: Value) -> Result<(), TetherError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key_path, value)
    }

    fn observe(&self, key_path: &str, observer: ObserverFn) -> Result<SubscriptionId, TetherError> {
        self.inner.observe(key_path, observer)
    }

    fn unobserve(&self, subscription: SubscriptionId) {
        self.inner.unobserve(subscription)
    }
}

/// Readable and writable, but refuses every observer registration
struct Unobservable {
    inner: PropertyMap,
}

impl Observable for Unobservable {
    fn get(&self, key_path: &str) -> Result<Value, TetherError> {
        self.inner.get(key_path)
    }

    fn set(&self, key_path: &str, value: Value) -> Result<(), TetherError> {
        self.inner.set(key_path, value)
    }

    fn observe(&self, key_path: &str, _observer: ObserverFn) -> Result<SubscriptionId, TetherError> {
        Err(TetherError::SubscriptionRejected {
            key_path: key_path.to_string(),
            details: "observation not supported".to_string(),
        })
    }

    fn unobserve(&self, _subscription: SubscriptionId) {}
}

// ============================================================================
// 1. INITIAL SYNC
// ============================================================================

#[test]
fn bind_syncs_target_immediately() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("user.name", json!("Ada")).unwrap();

    registry
        .bind(&target, "text", &source, "user.name", Direction::OneWay)
        .unwrap();

    assert_eq!(target.get("text").unwrap(), source.get("user.name").unwrap());
}

// ============================================================================
// 2. ONE-WAY FORWARDING
// ============================================================================

#[test]
fn one_way_forwards_source_changes() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("title", json!("draft")).unwrap();

    registry
        .bind(&target, "name", &source, "title", Direction::OneWay)
        .unwrap();

    source.set("title", json!("final")).unwrap();
    assert_eq!(target.get("name").unwrap(), json!("final"));
}

#[test]
fn one_way_ignores_target_changes() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("title", json!("original")).unwrap();

    registry
        .bind(&target, "name", &source, "title", Direction::OneWay)
        .unwrap();

    target.set("name", json!("local edit")).unwrap();
    assert_eq!(source.get("title").unwrap(), json!("original"));
}

// ============================================================================
// 3. TWO-WAY FORWARDING
// ============================================================================

#[test]
fn two_way_forwards_both_directions() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("v", json!(1)).unwrap();

    registry
        .bind(&target, "v", &source, "v", Direction::TwoWay)
        .unwrap();

    source.set("v", json!(2)).unwrap();
    assert_eq!(target.get("v").unwrap(), json!(2));

    target.set("v", json!(3)).unwrap();
    assert_eq!(source.get("v").unwrap(), json!(3));
}

#[test]
fn two_way_change_triggers_exactly_one_write() {
    let registry = Registry::new();
    let target = Arc::new(CountingMap::new());
    let source = Arc::new(CountingMap::new());
    let target_obs: Arc<dyn Observable> = target.clone();
    let source_obs: Arc<dyn Observable> = source.clone();
    source_obs.set("v", json!(0)).unwrap();

    registry
        .bind(&target_obs, "v", &source_obs, "v", Direction::TwoWay)
        .unwrap();
    // Counts so far: source 1 (seed), target 1 (initial sync)

    source_obs.set("v", json!(10)).unwrap();
    assert_eq!(source.set_count(), 2); // the external change only, no echo
    assert_eq!(target.set_count(), 2); // exactly one forwarded write

    target_obs.set("v", json!(20)).unwrap();
    assert_eq!(target.set_count(), 3);
    assert_eq!(source.set_count(), 3);
}

// ============================================================================
// 4. REBIND
// ============================================================================

#[test]
fn rebind_replaces_previous_binding() {
    let registry = Registry::new();
    let target = observable();
    let old_source = observable();
    let new_source = observable();
    old_source.set("v", json!("old")).unwrap();
    new_source.set("v", json!("new")).unwrap();

    registry
        .bind(&target, "name", &old_source, "v", Direction::OneWay)
        .unwrap();
    registry
        .bind(&target, "name", &new_source, "v", Direction::OneWay)
        .unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(target.get("name").unwrap(), json!("new"));

    // The old source's subscription was cancelled
    old_source.set("v", json!("stale")).unwrap();
    assert_eq!(target.get("name").unwrap(), json!("new"));

    new_source.set("v", json!("newer")).unwrap();
    assert_eq!(target.get("name").unwrap(), json!("newer"));
}

// ============================================================================
// 5. UNBIND
// ============================================================================

#[test]
fn unbind_stops_propagation_both_ways() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("v", json!(1)).unwrap();

    registry
        .bind(&target, "v", &source, "v", Direction::TwoWay)
        .unwrap();
    registry.unbind(&target, "v");

    source.set("v", json!(2)).unwrap();
    assert_eq!(target.get("v").unwrap(), json!(1));

    target.set("v", json!(3)).unwrap();
    assert_eq!(source.get("v").unwrap(), json!(2));
}

#[test]
fn unbind_during_notification_stops_inflight_propagation() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("v", json!(1)).unwrap();

    // Registered before the binding, so it runs first in dispatch order and
    // removes the pair while the binding's own callback is already queued
    let unbinder_registry = registry.clone();
    let unbinder_target = Arc::clone(&target);
    source
        .observe(
            "v",
            Arc::new(move |_| {
                unbinder_registry.unbind(&unbinder_target, "v");
                Ok(())
            }),
        )
        .unwrap();

    registry
        .bind(&target, "v", &source, "v", Direction::OneWay)
        .unwrap();

    source.set("v", json!(2)).unwrap();

    // The in-flight notification must not reach the target after unbind
    assert!(registry.is_empty());
    assert_eq!(target.get("v").unwrap(), json!(1));
}

// ============================================================================
// 6. UNBIND-ALL
// ============================================================================

#[test]
fn unbind_all_covers_target_and_source_roles() {
    let registry = Registry::new();
    let hub = observable();
    let upstream = observable();
    let downstream = observable();
    upstream.set("v", json!(1)).unwrap();
    hub.set("out", json!(0)).unwrap();

    // hub is target of one binding and source of another
    registry
        .bind(&hub, "in", &upstream, "v", Direction::OneWay)
        .unwrap();
    registry
        .bind(&downstream, "mirror", &hub, "out", Direction::OneWay)
        .unwrap();
    assert_eq!(registry.len(), 2);

    registry.unbind_all(&hub);
    assert!(registry.is_empty());

    upstream.set("v", json!(99)).unwrap();
    assert_eq!(hub.get("in").unwrap(), json!(1));

    hub.set("out", json!(99)).unwrap();
    assert_eq!(downstream.get("mirror").unwrap(), json!(0));
}

// ============================================================================
// 7. ENDPOINT DESTRUCTION
// ============================================================================

#[test]
fn change_after_target_destroyed_is_safe() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("v", json!(1)).unwrap();

    registry
        .bind(&target, "v", &source, "v", Direction::TwoWay)
        .unwrap();
    drop(target);

    // No panic, no dangling write; the stale binding is lazily purged
    source.set("v", json!(2)).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn change_after_source_destroyed_is_safe() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("v", json!(1)).unwrap();

    registry
        .bind(&target, "v", &source, "v", Direction::TwoWay)
        .unwrap();
    drop(source);

    target.set("v", json!(2)).unwrap();
    assert!(registry.is_empty());
    assert_eq!(target.get("v").unwrap(), json!(2));
}

#[test]
fn purge_via_guard_before_destruction() {
    let registry = Registry::new();
    let target = observable();
    let source = observable();
    source.set("v", json!(1)).unwrap();

    {
        let _guard = registry.unbind_on_drop(&source);
        registry
            .bind(&target, "v", &source, "v", Direction::OneWay)
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    assert!(registry.is_empty());
    source.set("v", json!(2)).unwrap();
    assert_eq!(target.get("v").unwrap(), json!(1));
}

// ============================================================================
// ATOMICITY & CONVENIENCE SURFACE
// ============================================================================

#[test]
fn failed_two_way_subscription_rolls_back() {
    let registry = Registry::new();
    // Target accepts reads/writes but refuses observation, so the two-way
    // target-side subscription fails after the source-side one succeeded
    let target: Arc<dyn Observable> = Arc::new(Unobservable {
        inner: PropertyMap::new(),
    });
    let source = observable();
    source.set("v", json!(1)).unwrap();

    let err = registry
        .bind(&target, "v", &source, "v", Direction::TwoWay)
        .unwrap_err();
    assert!(matches!(err, TetherError::SubscriptionRejected { .. }));
    assert!(registry.is_empty());

    // The source-side observer was rolled back: no forwarding happens
    source.set("v", json!(2)).unwrap();
    assert_eq!(target.get("v").unwrap(), json!(1)); // initial sync only
}

#[test]
fn per_object_surface_delegates_to_global() {
    let label = observable();
    let model = observable();
    model.set("count", json!(7)).unwrap();

    label
        .bind_key_path("display", &model, "count", Direction::OneWay)
        .unwrap();
    assert_eq!(label.get("display").unwrap(), json!(7));

    model.set("count", json!(8)).unwrap();
    assert_eq!(label.get("display").unwrap(), json!(8));

    label.unbind_key_path("display");
    model.set("count", json!(9)).unwrap();
    assert_eq!(label.get("display").unwrap(), json!(8));

    label.unbind_all_key_paths();
    model.unbind_all_key_paths();
}
