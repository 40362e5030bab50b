//! Reference `Observable` implementation backed by a JSON object
//!
//! `PropertyMap` is the property system the binding registry is tested
//! against, and a usable building block in its own right:
//! - dot-separated nested key paths (`user.address.city`, `items.0.name`),
//!   numeric segments index into arrays
//! - intermediate objects are created on write
//! - observers fire synchronously on exact-key-path writes; callbacks are
//!   snapshotted out of the lock before invocation, so an observer writing
//!   back into the same object (distinct key) cannot deadlock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::TetherError;
use crate::observable::{validate_key_path, Observable, ObserverFn, SubscriptionId};

/// JSON-object-backed property bag with synchronous change observation
pub struct PropertyMap {
    /// Root value, always an object
    values: RwLock<Value>,
    /// key path → registered observers
    observers: RwLock<FxHashMap<Arc<str>, Vec<(SubscriptionId, ObserverFn)>>>,
    next_sub: AtomicU64,
}

/// Human-readable type name for traversal errors
fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyMap {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(Value::Object(Map::new())),
            observers: RwLock::new(FxHashMap::default()),
            next_sub: AtomicU64::new(0),
        }
    }

    /// Create with initial properties
    pub fn from_object(object: Map<String, Value>) -> Self {
        Self {
            values: RwLock::new(Value::Object(object)),
            observers: RwLock::new(FxHashMap::default()),
            next_sub: AtomicU64::new(0),
        }
    }

    /// Clone of the full property tree
    pub fn snapshot(&self) -> Value {
        self.values.read().clone()
    }

    /// Notify observers registered on exactly `key_path`.
    ///
    /// Callbacks are cloned out of the lock first; the first observer error
    /// is returned to the caller of `set`.
    fn notify(&self, key_path: &str, value: &Value) -> Result<(), TetherError> {
        let snapshot: Vec<ObserverFn> = {
            let observers = self.observers.read();
            observers
                .get(key_path)
                .map(|list| list.iter().map(|(_, f)| Arc::clone(f)).collect())
                .unwrap_or_default()
        };
        for observer in snapshot {
            observer(value)?;
        }
        Ok(())
    }
}

impl Observable for PropertyMap {
    fn get(&self, key_path: &str) -> Result<Value, TetherError> {
        validate_key_path(key_path)?;

        let root = self.values.read();
        let mut current = &*root;

        for segment in key_path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| TetherError::PathNotFound {
                    path: key_path.to_string(),
                })?,
                Value::Array(items) => {
                    let idx: usize =
                        segment.parse().map_err(|_| TetherError::InvalidTraversal {
                            segment: segment.to_string(),
                            value_type: "array".to_string(),
                            path: key_path.to_string(),
                        })?;
                    items.get(idx).ok_or_else(|| TetherError::PathNotFound {
                        path: key_path.to_string(),
                    })?
                }
                other => {
                    return Err(TetherError::InvalidTraversal {
                        segment: segment.to_string(),
                        value_type: value_type(other).to_string(),
                        path: key_path.to_string(),
                    })
                }
            };
        }
        Ok(current.clone())
    }

    fn set(&self, key_path: &str, value: Value) -> Result<(), TetherError> {
        validate_key_path(key_path)?;

        {
            let mut root = self.values.write();
            let mut current = &mut *root;

            let segments: Vec<&str> = key_path.split('.').collect();
            let (last, parents) = segments.split_last().expect("validated non-empty");

            for segment in parents {
                current = match current {
                    Value::Object(map) => map
                        .entry(segment.to_string())
                        .or_insert_with(|| Value::Object(Map::new())),
                    Value::Array(items) => {
                        let idx: usize =
                            segment.parse().map_err(|_| TetherError::InvalidTraversal {
                                segment: segment.to_string(),
                                value_type: "array".to_string(),
                                path: key_path.to_string(),
                            })?;
                        items.get_mut(idx).ok_or_else(|| TetherError::PathNotFound {
                            path: key_path.to_string(),
                        })?
                    }
                    other => {
                        return Err(TetherError::InvalidTraversal {
                            segment: segment.to_string(),
                            value_type: value_type(other).to_string(),
                            path: key_path.to_string(),
                        })
                    }
                };
            }

            match current {
                Value::Object(map) => {
                    map.insert(last.to_string(), value.clone());
                }
                Value::Array(items) => {
                    let idx: usize = last.parse().map_err(|_| TetherError::InvalidTraversal {
                        segment: last.to_string(),
                        value_type: "array".to_string(),
                        path: key_path.to_string(),
                    })?;
                    if idx < items.len() {
                        items[idx] = value.clone();
                    } else if idx == items.len() {
                        items.push(value.clone());
                    } else {
                        return Err(TetherError::PathNotFound {
                            path: key_path.to_string(),
                        });
                    }
                }
                other => {
                    return Err(TetherError::InvalidTraversal {
                        segment: last.to_string(),
                        value_type: value_type(other).to_string(),
                        path: key_path.to_string(),
                    })
                }
            }
        } // write lock released before observers run

        self.notify(key_path, &value)
    }

    fn observe(&self, key_path: &str, observer: ObserverFn) -> Result<SubscriptionId, TetherError> {
        validate_key_path(key_path)?;

        let id = SubscriptionId::from_raw(self.next_sub.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .entry(Arc::from(key_path))
            .or_default()
            .push((id, observer));
        Ok(id)
    }

    fn unobserve(&self, subscription: SubscriptionId) {
        let mut observers = self.observers.write();
        for list in observers.values_mut() {
            list.retain(|(id, _)| *id != subscription);
        }
        observers.retain(|_, list| !list.is_empty());
    }
}
