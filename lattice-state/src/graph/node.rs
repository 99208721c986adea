//! Graph Nodes
//!
//! A node is one addressable location in an observed tree. It never stores
//! the value found there: the value is always recomputed by walking parent
//! links down from the tree's raw value, so a node is a pure path index.

use indexmap::IndexMap;

use super::Key;
use crate::reactive::{Listener, ListenerId};

/// Unique identifier for a node within its tree's arena.
///
/// The generation distinguishes a reclaimed slot from the node that
/// previously lived there; a handle holding an old generation no longer
/// resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The root node of every arena.
    pub const ROOT: NodeId = NodeId {
        index: 0,
        generation: 0,
    };

    /// An id that never resolves in any arena.
    pub const DANGLING: NodeId = NodeId {
        index: u32::MAX,
        generation: 0,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot this id was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A node in the observed tree.
#[derive(Default)]
pub struct Node {
    /// Containing node; `None` only for the root.
    pub(crate) parent: Option<NodeId>,

    /// Slot under the parent. Reassigned when an array reorder moves the
    /// element this node follows.
    pub(crate) key: Option<Key>,

    /// Children created so far, keyed by their slot.
    pub(crate) children: IndexMap<Key, NodeId>,

    /// Registered listeners in registration order.
    pub(crate) listeners: Vec<Listener>,
}

impl Node {
    /// Create the root node of a tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Create a node occupying `key` under `parent`.
    pub fn child_of(parent: NodeId, key: Key) -> Self {
        Self {
            parent: Some(parent),
            key: Some(key),
            ..Self::default()
        }
    }

    /// The containing node.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The slot this node occupies under its parent.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Whether any listener is registered here.
    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id() != id);
        self.listeners.len() != before
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("parent", &self.parent)
            .field("key", &self.key)
            .field("children", &self.children.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent_or_key() {
        let node = Node::root();
        assert!(node.parent().is_none());
        assert!(node.key().is_none());
        assert!(!node.has_listeners());
    }

    #[test]
    fn child_records_its_slot() {
        let parent = NodeId::new(0, 0);
        let node = Node::child_of(parent, Key::from("a"));
        assert_eq!(node.parent(), Some(parent));
        assert_eq!(node.key(), Some(&Key::from("a")));
    }

    #[test]
    fn listeners_are_removed_by_id() {
        let mut node = Node::root();
        let listener = Listener::new(false, |_| {});
        let id = listener.id();
        node.add_listener(listener);
        node.add_listener(Listener::new(true, |_| {}));
        assert_eq!(node.listener_count(), 2);

        assert!(node.remove_listener(id));
        assert!(!node.remove_listener(id));
        assert_eq!(node.listener_count(), 1);
    }
}
