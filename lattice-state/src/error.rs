//! Error types for observable writes.
//!
//! The core operations never fail loudly: an out-of-contract write is a
//! no-op. The `try_*` variants return these errors for callers that want to
//! surface the violation.

use thiserror::Error;

use crate::graph::Key;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, StateError>;

/// Reasons a write was rejected.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// The node was reclaimed after an array reorder displaced it.
    #[error("node is no longer attached to its tree")]
    StaleNode,

    /// The write targets a key inside a primitive value.
    #[error("cannot write key '{key}' into the primitive at '{path}'")]
    NotAContainer { path: String, key: Key },

    /// Arrays only accept index keys.
    #[error("array cannot hold non-index key '{key}'")]
    InvalidArrayKey { key: String },

    /// The array cannot grow to hold the index.
    #[error("index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Conversion between a typed value and the tree failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StateError {
    /// Attach the container path to a [`StateError::NotAContainer`].
    pub(crate) fn at_path(self, at: String) -> Self {
        match self {
            StateError::NotAContainer { key, .. } => StateError::NotAContainer { path: at, key },
            other => other,
        }
    }
}
