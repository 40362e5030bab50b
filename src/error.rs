//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum TetherError {
    // ─────────────────────────────────────────────────────────────
    // Key path errors (TETHER-010 to TETHER-012)
    // ─────────────────────────────────────────────────────────────

    #[error("TETHER-010: Invalid key path '{path}'")]
    InvalidKeyPath { path: String },

    #[error("TETHER-011: Key path '{path}' not found")]
    PathNotFound { path: String },

    #[error("TETHER-012: Cannot traverse '{segment}' on {value_type} (expected object/array) in '{path}'")]
    InvalidTraversal {
        segment: String,
        value_type: String,
        path: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Binding errors (TETHER-020 to TETHER-021)
    // ─────────────────────────────────────────────────────────────

    #[error("TETHER-020: Cannot bind '{key_path}' to itself on the same object")]
    SelfBinding { key_path: String },

    #[error("TETHER-021: Observer registration rejected for '{key_path}': {details}")]
    SubscriptionRejected { key_path: String, details: String },
}

impl FixSuggestion for TetherError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            TetherError::InvalidKeyPath { .. } => {
                Some("Use a non-empty dot-separated path like 'user.name' or 'items.0'")
            }
            TetherError::PathNotFound { .. } => {
                Some("Set the property before binding, or check the path spelling")
            }
            TetherError::InvalidTraversal { .. } => {
                Some("Check the path - you're trying to access a field on a non-container value")
            }
            TetherError::SelfBinding { .. } => {
                Some("Bind to a different object or a different key path")
            }
            TetherError::SubscriptionRejected { .. } => {
                Some("Check the object supports observation on this key path")
            }
        }
    }
}
