//! Tether - key-path property binding registry
//!
//! Makes one object's property automatically track (or be tracked by)
//! another object's property, identified by string key paths:
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use tether::{Direction, Observable, PropertyMap, Registry};
//!
//! let registry = Registry::new();
//! let label: Arc<dyn Observable> = Arc::new(PropertyMap::new());
//! let model: Arc<dyn Observable> = Arc::new(PropertyMap::new());
//!
//! model.set("user.name", json!("Ada")).unwrap();
//! registry.bind(&label, "text", &model, "user.name", Direction::OneWay).unwrap();
//! assert_eq!(label.get("text").unwrap(), json!("Ada"));
//!
//! model.set("user.name", json!("Grace")).unwrap();
//! assert_eq!(label.get("text").unwrap(), json!("Grace"));
//! ```

pub mod binding;
pub mod error;
pub mod observable;
pub mod property;
pub mod registry;

pub use binding::{Binding, Direction};
pub use error::{FixSuggestion, TetherError};
pub use observable::{Observable, ObservableExt, ObjectId, ObserverFn, SubscriptionId};
pub use property::PropertyMap;
pub use registry::{Registry, UnbindGuard};
