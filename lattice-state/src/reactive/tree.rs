//! Tree State
//!
//! The shared state behind every handle of one observable: the raw value,
//! the node arena, the batcher and the tree-wide flags.
//!
//! Primitive roots are stored boxed as `{"current": value}` so that a root
//! write has a container to assign into. Path resolution starts below the
//! box, so nodes never see the `current` key.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::batch::Batcher;
use super::diff::WriteScope;
use crate::error::Result;
use crate::graph::{NodeArena, NodeId};
use crate::value;

/// Key under which primitive roots are boxed.
pub(crate) const CURRENT: &str = "current";

/// Shared state of one observable tree.
pub struct Tree {
    pub(crate) nodes: RwLock<NodeArena>,
    pub(crate) value: RwLock<Value>,
    pub(crate) batcher: Batcher,
    is_primitive: bool,
    locked: AtomicBool,
}

impl Tree {
    pub(crate) fn new(initial: Option<Value>) -> Self {
        let is_primitive = initial.as_ref().map_or(true, value::is_primitive);
        let raw = match initial {
            Some(value) if !is_primitive => value,
            other => {
                let mut boxed = Map::new();
                if let Some(value) = other {
                    boxed.insert(CURRENT.to_owned(), value);
                }
                Value::Object(boxed)
            }
        };
        Self {
            nodes: RwLock::new(NodeArena::new()),
            value: RwLock::new(raw),
            batcher: Batcher::new(),
            is_primitive,
            locked: AtomicBool::new(false),
        }
    }

    /// Whether the tree was created from a primitive.
    pub fn is_primitive(&self) -> bool {
        self.is_primitive
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// The value nodes resolve against, unboxing primitive roots.
    pub(crate) fn data<'v>(&self, raw: &'v Value) -> Option<&'v Value> {
        if self.is_primitive {
            raw.get(CURRENT)
        } else {
            Some(raw)
        }
    }

    /// Clone the live value at `id`.
    pub(crate) fn resolve(&self, id: NodeId) -> Option<Value> {
        let nodes = self.nodes.read();
        let raw = self.value.read();
        nodes.resolve(id, self.data(&raw)).cloned()
    }

    /// Run a write inside a [`WriteScope`], then dispatch what it changed.
    ///
    /// Notifications are built while the scope still holds the tree, and
    /// delivered (or queued, inside a batch) after every lock is released,
    /// so listeners are free to read and write again.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut WriteScope<'_>) -> Result<R>) -> Result<R> {
        let mut scope = WriteScope::new(self);
        let result = f(&mut scope);
        let notifications = scope.commit();
        self.batcher.dispatch(notifications);
        result
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.nodes.read().len())
            .field("is_primitive", &self.is_primitive)
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_are_boxed() {
        let tree = Tree::new(Some(json!(5)));
        assert!(tree.is_primitive());
        assert_eq!(*tree.value.read(), json!({"current": 5}));
        assert_eq!(tree.resolve(NodeId::ROOT), Some(json!(5)));
    }

    #[test]
    fn undefined_roots_are_empty_boxes() {
        let tree = Tree::new(None);
        assert!(tree.is_primitive());
        assert_eq!(tree.resolve(NodeId::ROOT), None);
    }

    #[test]
    fn objects_are_stored_as_is() {
        let tree = Tree::new(Some(json!({"a": 1})));
        assert!(!tree.is_primitive());
        assert_eq!(tree.resolve(NodeId::ROOT), Some(json!({"a": 1})));
    }

    #[test]
    fn lock_flag_round_trips() {
        let tree = Tree::new(Some(json!({})));
        assert!(!tree.is_locked());
        tree.set_locked(true);
        assert!(tree.is_locked());
    }
}
