//! Lattice State
//!
//! This crate provides fine-grained reactive state for Lattice: a mutable
//! tree of JSON values whose reads can be tracked and whose writes notify
//! exactly the listeners interested in the part that changed.
//!
//! It implements:
//!
//! - A lazily built node tree that gives every path a stable identity
//! - Handles and typed accessors for reading and writing through nodes
//! - A diff engine that keeps array element nodes attached across reorders
//! - Batching that folds multi-step writes into one notification
//! - Dependency tracking for observers and computed values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node identities, keys and the per-tree node arena
//! - `reactive`: Handles, the diff and dispatch passes, batching, observers
//! - `value`: Helpers over the wrapped JSON value
//! - `helpers`: Deep merging and the lock flag
//! - `error`: Reasons a write can be rejected
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_state::{observable, observe};
//! use serde_json::json;
//!
//! let state = observable(json!({"count": 0}));
//!
//! let counter = state.clone();
//! let _observer = observe(move |cx| {
//!     println!("count: {:?}", counter.child("count").get_tracked(cx));
//! });
//!
//! state.child("count").set(5);
//! // Observer re-runs, prints: "count: Some(Number(5))"
//! ```

pub mod error;
pub mod graph;
pub mod helpers;
pub mod reactive;
pub mod value;

pub use error::{Result, StateError};
pub use graph::{Key, NodeId, Path};
pub use helpers::{lock_observable, merge_into_observable, merge_into_value, MergeSource};
pub use reactive::{
    computed, observable, observe, Accessor, ArrayNode, BatchGuard, Change, Computed, Disposer, NodeView,
    ObjectNode, Observable, Observer, PrimitiveNode, Read, TrackingContext,
};
pub use value::IntoValue;
