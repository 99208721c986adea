//! Listener types for the reactive system.
//!
//! A listener is a callback registered on one node. It receives a
//! [`Change`] whenever a write touches that node, either directly or by
//! bubbling up from a descendant.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::notify::Change;
use super::tree::Tree;
use crate::graph::NodeId;

/// Unique identifier for a listener registration.
///
/// Each registration gets its own id, even when the same closure is
/// registered twice. An observer reuses one id for all of its
/// registrations. The batcher coalesces queued notifications by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked with each change record.
pub(crate) type Callback = Arc<dyn Fn(&Change) + Send + Sync>;

/// A listener registration on a node.
pub struct Listener {
    id: ListenerId,
    callback: Callback,
    /// Shallow listeners only hear changes at their own node.
    shallow: bool,
}

impl Listener {
    /// Create a registration for the given callback.
    pub fn new<F>(shallow: bool, callback: F) -> Self
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        Self::from_callback(shallow, Arc::new(callback))
    }

    pub(crate) fn from_callback(shallow: bool, callback: Callback) -> Self {
        Self::with_id(ListenerId::new(), shallow, callback)
    }

    /// A registration under an existing id. Notifications for registrations
    /// sharing an id are delivered once per write or batch.
    pub(crate) fn with_id(id: ListenerId, shallow: bool, callback: Callback) -> Self {
        Self { id, callback, shallow }
    }

    /// Get the listener's unique ID.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether this listener ignores changes bubbling up from descendants.
    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    /// Whether a change `level` steps below this node reaches the listener.
    ///
    /// Level 0 is the node itself, -1 marks the creation of a key (which
    /// also counts as a change of the parent's own shape).
    pub fn accepts(&self, level: i32) -> bool {
        !self.shallow || level <= 0
    }

    pub(crate) fn callback(&self) -> &Callback {
        &self.callback
    }
}

/// Handle returned by the `on_*` registration methods.
///
/// Dropping a disposer leaves the listener registered; call
/// [`Disposer::dispose`] to remove it.
#[derive(Debug, Clone)]
pub struct Disposer {
    tree: Weak<Tree>,
    node: NodeId,
    id: ListenerId,
}

impl Disposer {
    pub(crate) fn new(tree: &Arc<Tree>, node: NodeId, id: ListenerId) -> Self {
        Self {
            tree: Arc::downgrade(tree),
            node,
            id,
        }
    }

    /// A disposer for a registration that never happened.
    pub(crate) fn inert() -> Self {
        Self {
            tree: Weak::new(),
            node: NodeId::DANGLING,
            id: ListenerId::new(),
        }
    }

    /// The listener this disposer removes.
    pub fn listener_id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Returns whether it was still registered.
    ///
    /// Notifications already queued by an open batch are still delivered.
    pub fn dispose(&self) -> bool {
        match self.tree.upgrade() {
            Some(tree) => tree.nodes.write().remove_listener(self.node, self.id),
            None => false,
        }
    }
}
