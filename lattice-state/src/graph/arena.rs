//! Node Arena
//!
//! Every tree owns one arena. Nodes are created lazily the first time a path
//! is accessed and memoized per `(parent, key)`, so repeated access to the
//! same path yields the same [`NodeId`].
//!
//! Slots are reclaimed only for nodes displaced by an array reorder whose
//! subtree nobody listens to. Reclaiming bumps the slot generation, which
//! invalidates every outstanding id for it.

use serde_json::Value;

use super::{Key, Node, NodeId, Path};
use crate::reactive::{Listener, ListenerId};
use crate::value;

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Storage for the nodes of one tree.
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl NodeArena {
    /// Create an arena containing only the root node.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::root()),
            }],
            free: Vec::new(),
        }
    }

    /// The root node's id.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Look up a live node.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    /// Whether `id` still names a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Existing child at `key`, without creating one.
    pub fn child(&self, parent: NodeId, key: &Key) -> Option<NodeId> {
        self.get(parent)?.children.get(key).copied()
    }

    /// The unique child of `parent` at `key`, created on first access.
    ///
    /// Returns `None` when `parent` is stale.
    pub fn get_child_node(&mut self, parent: NodeId, key: Key) -> Option<NodeId> {
        if let Some(existing) = self.child(parent, &key) {
            return Some(existing);
        }
        if !self.contains(parent) {
            return None;
        }
        let id = self.allocate(Node::child_of(parent, key.clone()));
        self.get_mut(parent)?.children.insert(key, id);
        Some(id)
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId::new(index, 0)
            }
        }
    }

    /// Keys from the root down to `id`.
    pub fn path_of(&self, id: NodeId) -> Option<Path> {
        let mut path = Path::new();
        let mut current = self.get(id)?;
        while let (Some(parent), Some(key)) = (current.parent, current.key.as_ref()) {
            path.push(key.clone());
            current = self.get(parent)?;
        }
        path.reverse();
        Some(path)
    }

    /// Resolve a node to its live value by re-indexing `data` along the
    /// node's path. `None` when any intermediate value is absent.
    pub fn resolve<'v>(&self, id: NodeId, data: Option<&'v Value>) -> Option<&'v Value> {
        let path = self.path_of(id)?;
        path.iter().try_fold(data?, |current, key| value::index(current, key))
    }

    /// Move `node` to `key` under `parent`, taking over that slot.
    ///
    /// The mapping at the node's old key is dropped if it still points here,
    /// so the old slot gets a fresh node on next access.
    pub(crate) fn relocate(&mut self, parent: NodeId, node: NodeId, key: Key) {
        let old_key = match self.get_mut(node) {
            Some(moved) => moved.key.replace(key.clone()),
            None => return,
        };
        if let Some(parent_node) = self.get_mut(parent) {
            if let Some(old_key) = old_key {
                if parent_node.children.get(&old_key) == Some(&node) {
                    parent_node.children.shift_remove(&old_key);
                }
            }
            parent_node.children.insert(key, node);
        }
    }

    /// Whether a listener is registered on `id` or any of its descendants.
    pub fn has_listeners_in_subtree(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        node.has_listeners()
            || node
                .children
                .values()
                .any(|child| self.has_listeners_in_subtree(*child))
    }

    /// Free `id` and its descendants if none of them has listeners.
    ///
    /// Returns whether the subtree was reclaimed.
    pub(crate) fn reclaim_unobserved(&mut self, id: NodeId) -> bool {
        if id == self.root() || !self.contains(id) || self.has_listeners_in_subtree(id) {
            return false;
        }
        let (parent, key) = match self.get(id) {
            Some(node) => (node.parent, node.key.clone()),
            None => return false,
        };
        if let (Some(parent), Some(key)) = (parent, key) {
            if let Some(parent_node) = self.get_mut(parent) {
                if parent_node.children.get(&key) == Some(&id) {
                    parent_node.children.shift_remove(&key);
                }
            }
        }
        self.free_subtree(id);
        true
    }

    fn free_subtree(&mut self, id: NodeId) {
        let slot = &mut self.slots[id.index() as usize];
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        for child in node.children.into_values() {
            if self.contains(child) {
                self.free_subtree(child);
            }
        }
    }

    /// Register a listener on `id`. Returns `false` if the node is stale.
    pub(crate) fn add_listener(&mut self, id: NodeId, listener: Listener) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.add_listener(listener);
                true
            }
            None => false,
        }
    }

    /// Remove a listener from `id`. Returns whether it was registered.
    pub(crate) fn remove_listener(&mut self, id: NodeId, listener: ListenerId) -> bool {
        self.get_mut(id)
            .map(|node| node.remove_listener(listener))
            .unwrap_or(false)
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}
