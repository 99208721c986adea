//! Batching
//!
//! A batch is a begin/end scope on one tree. While the nesting depth is
//! nonzero, notifications produced by writes are queued instead of
//! delivered; when the outermost scope ends, the queue is flushed in the
//! order listeners were first enqueued.
//!
//! The queue holds at most one entry per listener. A later notification for
//! an already queued listener replaces the record but keeps its position and
//! its `previous()` baseline, so a listener sees one change spanning the
//! whole batch.

use std::sync::Arc;

use indexmap::map::Entry;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::notify::Change;
use super::subscriber::{Callback, ListenerId};
use super::tree::Tree;

/// A change ready to be handed to one listener.
pub(crate) struct Notification {
    listener: ListenerId,
    callback: Callback,
    change: Change,
}

impl Notification {
    pub(crate) fn new(listener: ListenerId, callback: Callback, change: Change) -> Self {
        Self {
            listener,
            callback,
            change,
        }
    }

    #[cfg(test)]
    pub(crate) fn change(&self) -> &Change {
        &self.change
    }

    fn deliver(&self) {
        (self.callback)(&self.change);
    }
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    queue: IndexMap<ListenerId, Notification>,
}

/// Per-tree batching coordinator.
#[derive(Default)]
pub(crate) struct Batcher {
    state: Mutex<BatchState>,
}

impl Batcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Open a batch scope.
    pub(crate) fn begin(&self) {
        self.state.lock().depth += 1;
    }

    /// Close a batch scope, flushing the queue when the outermost one ends.
    pub(crate) fn end(&self) {
        let flushed = {
            let mut state = self.state.lock();
            state.depth = state.depth.saturating_sub(1);
            if state.depth > 0 {
                return;
            }
            std::mem::take(&mut state.queue)
        };
        if flushed.is_empty() {
            return;
        }
        tracing::trace!(listeners = flushed.len(), "flushing batch");
        for notification in flushed.into_values() {
            notification.deliver();
        }
    }

    /// Current nesting depth.
    pub(crate) fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Deliver `notifications` now, or queue them inside a batch.
    ///
    /// Either way a listener id hears at most once per call.
    pub(crate) fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let ready = {
            let mut state = self.state.lock();
            if state.depth > 0 {
                for notification in notifications {
                    enqueue(&mut state.queue, notification);
                }
                return;
            }
            let mut ready = IndexMap::new();
            for notification in notifications {
                enqueue(&mut ready, notification);
            }
            ready
        };
        for notification in ready.into_values() {
            notification.deliver();
        }
    }
}

/// Add `notification` to `queue`, folding it into an earlier one for the
/// same listener id.
fn enqueue(queue: &mut IndexMap<ListenerId, Notification>, notification: Notification) {
    match queue.entry(notification.listener) {
        Entry::Occupied(mut queued) => {
            let merged = queued.get().change.coalesce(&notification.change);
            queued.get_mut().change = merged;
        }
        Entry::Vacant(slot) => {
            slot.insert(notification);
        }
    }
}

/// An open batch scope. The batch ends when the guard is dropped.
///
/// Created by [`Observable::begin_batch`](super::Observable::begin_batch).
#[must_use = "the batch ends as soon as the guard is dropped"]
pub struct BatchGuard {
    tree: Arc<Tree>,
}

impl BatchGuard {
    pub(crate) fn new(tree: Arc<Tree>) -> Self {
        tree.batcher.begin();
        Self { tree }
    }

    /// Nesting depth of the tree's batch, this guard included.
    pub fn depth(&self) -> usize {
        self.tree.batcher.depth()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.tree.batcher.end();
    }
}

impl std::fmt::Debug for BatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchGuard").field("depth", &self.depth()).finish()
    }
}
