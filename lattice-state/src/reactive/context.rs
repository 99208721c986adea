//! Tracking Context
//!
//! A tracking context records which nodes an observing computation read.
//! It is an explicit value handed to the computation rather than ambient
//! state: reads that should count as dependencies go through
//! [`Observable::get_tracked`] or [`Observable::read`] with the context.
//!
//! # Shallow Reads
//!
//! Calling [`TrackingContext::shallow`] marks the next tracked read as
//! shallow: the computation re-runs when the node itself is replaced or
//! gains a key, but not for changes deeper down. The flag is consumed by
//! that read. A node read both ways is tracked deep.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use indexmap::IndexMap;

use super::Observable;
use crate::graph::NodeId;

/// A node read during one run of an observing computation.
#[derive(Debug, Clone)]
pub(crate) struct TrackedNode {
    pub(crate) observable: Observable,
    pub(crate) shallow: bool,
}

/// Identity of a node across trees: the tree's address and the node id.
pub(crate) type TrackKey = (usize, NodeId);

pub(crate) fn track_key(observable: &Observable) -> TrackKey {
    (Arc::as_ptr(observable.tree()) as usize, observable.node_id())
}

/// The dependency set collected while a computation runs.
#[derive(Debug, Default)]
pub struct TrackingContext {
    nodes: RefCell<IndexMap<TrackKey, TrackedNode>>,
    shallow_next: Cell<bool>,
}

impl TrackingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the next read shallowly.
    ///
    /// ```rust,ignore
    /// let _ = state.child("items").get_tracked(cx.shallow());
    /// ```
    pub fn shallow(&self) -> &Self {
        self.shallow_next.set(true);
        self
    }

    /// Record a read of `observable`.
    pub(crate) fn track(&self, observable: &Observable) {
        let shallow = self.shallow_next.replace(false);
        let mut nodes = self.nodes.borrow_mut();
        nodes
            .entry(track_key(observable))
            .and_modify(|tracked| tracked.shallow &= shallow)
            .or_insert_with(|| TrackedNode {
                observable: observable.clone(),
                shallow,
            });
    }

    /// Number of distinct nodes read so far.
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Whether nothing has been read yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Whether `observable` was read.
    pub fn contains(&self, observable: &Observable) -> bool {
        self.nodes.borrow().contains_key(&track_key(observable))
    }

    /// Whether `observable` was read, and only shallowly.
    pub fn is_shallow(&self, observable: &Observable) -> bool {
        self.nodes
            .borrow()
            .get(&track_key(observable))
            .is_some_and(|tracked| tracked.shallow)
    }

    pub(crate) fn into_nodes(self) -> IndexMap<TrackKey, TrackedNode> {
        self.nodes.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_are_recorded_once() {
        let state = Observable::new(json!({"a": 1, "b": 2}));
        let cx = TrackingContext::new();

        assert!(cx.is_empty());
        state.child("a").get_tracked(&cx);
        state.child("a").get_tracked(&cx);
        state.child("b").get_tracked(&cx);

        assert_eq!(cx.len(), 2);
        assert!(cx.contains(&state.child("a")));
        assert!(!cx.contains(&state));
    }

    #[test]
    fn shallow_flag_applies_to_the_next_read_only() {
        let state = Observable::new(json!({"a": {}, "b": {}}));
        let cx = TrackingContext::new();

        state.child("a").get_tracked(cx.shallow());
        state.child("b").get_tracked(&cx);

        assert!(cx.is_shallow(&state.child("a")));
        assert!(!cx.is_shallow(&state.child("b")));
    }

    #[test]
    fn deep_reads_upgrade_shallow_ones() {
        let state = Observable::new(json!({"a": {}}));
        let cx = TrackingContext::new();

        state.child("a").get_tracked(cx.shallow());
        state.child("a").get_tracked(&cx);
        assert!(!cx.is_shallow(&state.child("a")));
    }

    #[test]
    fn nodes_of_different_trees_are_distinct() {
        let first = Observable::new(json!({"a": 1}));
        let second = Observable::new(json!({"a": 1}));
        let cx = TrackingContext::new();

        first.child("a").get_tracked(&cx);
        second.child("a").get_tracked(&cx);
        assert_eq!(cx.into_nodes().len(), 2);
    }
}
