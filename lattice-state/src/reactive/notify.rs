//! Dispatch Pass
//!
//! Turns the change-set recorded by a write into listener notifications.
//! Each change starts at the node that changed and walks up through its
//! ancestors; at every level the keys walked so far form the path from the
//! notified node down to the change.
//!
//! Shallow listeners only fire at level `<= 0`. The level starts at 0 for an
//! update or -1 for a newly created key, and grows by one per ancestor.

use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use super::batch::Notification;
use super::diff::PendingChange;
use crate::graph::{Key, NodeArena, Path};
use crate::value;

/// A change record delivered to a listener.
///
/// Cloning is cheap; all listeners of one node share the same record.
#[derive(Clone)]
pub struct Change {
    inner: Arc<ChangeInner>,
}

struct ChangeInner {
    /// Value of the notified node after the change.
    value: Option<Value>,
    /// Keys from the notified node down to the changed node.
    path: Path,
    value_at_path: Option<Value>,
    prev_at_path: Option<Value>,
    previous: Arc<Previous>,
}

/// Lazily reconstructed value of the notified node before the change.
struct Previous {
    value: Option<Value>,
    path: Path,
    prev_at_path: Option<Value>,
    cached: OnceLock<Option<Value>>,
}

impl Previous {
    fn get(&self) -> Option<Value> {
        self.cached
            .get_or_init(|| reconstruct_previous(self.value.as_ref(), &self.path, self.prev_at_path.clone()))
            .clone()
    }
}

impl Change {
    pub(crate) fn new(value: Option<Value>, path: Path, value_at_path: Option<Value>, prev_at_path: Option<Value>) -> Self {
        let previous = Arc::new(Previous {
            value: value.clone(),
            path: path.clone(),
            prev_at_path: prev_at_path.clone(),
            cached: OnceLock::new(),
        });
        Self {
            inner: Arc::new(ChangeInner {
                value,
                path,
                value_at_path,
                prev_at_path,
                previous,
            }),
        }
    }

    /// Fold a later change for the same listener into this one.
    ///
    /// The result carries the later record, but [`Change::previous`] keeps
    /// describing the state before `self`.
    pub(crate) fn coalesce(&self, later: &Change) -> Change {
        Change {
            inner: Arc::new(ChangeInner {
                value: later.inner.value.clone(),
                path: later.inner.path.clone(),
                value_at_path: later.inner.value_at_path.clone(),
                prev_at_path: later.inner.prev_at_path.clone(),
                previous: Arc::clone(&self.inner.previous),
            }),
        }
    }

    /// Value of the notified node after the change.
    pub fn value(&self) -> Option<&Value> {
        self.inner.value.as_ref()
    }

    /// Keys from the notified node down to the node that changed. Empty when
    /// the notified node changed itself.
    pub fn path(&self) -> &[Key] {
        &self.inner.path
    }

    /// New value at the changed node.
    pub fn value_at_path(&self) -> Option<&Value> {
        self.inner.value_at_path.as_ref()
    }

    /// Previous value at the changed node.
    pub fn prev_at_path(&self) -> Option<&Value> {
        self.inner.prev_at_path.as_ref()
    }

    /// The notified node's full value before the change.
    ///
    /// Computed on first call and shared by every listener of the node.
    pub fn previous(&self) -> Option<Value> {
        self.inner.previous.get()
    }
}

impl std::fmt::Debug for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Change")
            .field("value", &self.inner.value)
            .field("path", &self.inner.path)
            .field("value_at_path", &self.inner.value_at_path)
            .field("prev_at_path", &self.inner.prev_at_path)
            .finish()
    }
}

/// Clone `value` and put `prev_at_path` back at `path`.
pub(crate) fn reconstruct_previous(value: Option<&Value>, path: &[Key], prev_at_path: Option<Value>) -> Option<Value> {
    let Some((last, parents)) = path.split_last() else {
        return prev_at_path;
    };
    let mut clone = value.cloned().unwrap_or_else(|| Value::Object(Map::new()));
    let mut current = &mut clone;
    for key in parents {
        match value::entry_mut(current, key) {
            Ok(next) => current = next,
            Err(_) => return Some(clone),
        }
    }
    let _ = value::put(current, last, prev_at_path);
    Some(clone)
}

/// Append notifications for `change` and each ancestor it bubbles to.
pub(crate) fn collect(nodes: &NodeArena, data: Option<&Value>, change: &PendingChange, out: &mut Vec<Notification>) {
    let mut id = change.node;
    let mut path = Path::new();
    let mut level = change.level;

    while let Some(node) = nodes.get(id) {
        let listening: Vec<_> = node.listeners.iter().filter(|l| l.accepts(level)).collect();
        if !listening.is_empty() {
            let value = if path.is_empty() {
                change.value.clone()
            } else {
                nodes.resolve(id, data).cloned()
            };
            let record = Change::new(value, path.clone(), change.value.clone(), change.prev.clone());
            for listener in listening {
                out.push(Notification::new(listener.id(), Arc::clone(listener.callback()), record.clone()));
            }
        }

        if !change.bubble {
            break;
        }
        match (node.parent(), node.key()) {
            (Some(parent), Some(key)) => {
                path.insert(0, key.clone());
                level += 1;
                id = parent;
            }
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Listener;
    use serde_json::json;
    use smallvec::smallvec;

    #[test]
    fn previous_substitutes_the_old_subtree() {
        let path: Path = smallvec![Key::from("a"), Key::from("b")];
        let prev = reconstruct_previous(Some(&json!({"a": {"b": 2}, "c": 3})), &path, Some(json!(1)));
        assert_eq!(prev, Some(json!({"a": {"b": 1}, "c": 3})));
    }

    #[test]
    fn previous_of_a_created_key_drops_it() {
        let path: Path = smallvec![Key::from("a")];
        let prev = reconstruct_previous(Some(&json!({"a": 1, "b": 2})), &path, None);
        assert_eq!(prev, Some(json!({"b": 2})));
    }

    #[test]
    fn previous_at_the_node_itself_is_the_old_value() {
        assert_eq!(reconstruct_previous(Some(&json!(5)), &[], Some(json!(4))), Some(json!(4)));
        assert_eq!(reconstruct_previous(None, &[], None), None);
    }

    #[test]
    fn previous_is_computed_once() {
        let path: Path = smallvec![Key::from("a")];
        let change = Change::new(Some(json!({"a": 2})), path, Some(json!(2)), Some(json!(1)));
        let shared = change.clone();
        assert_eq!(change.previous(), Some(json!({"a": 1})));
        assert!(shared.inner.previous.cached.get().is_some());
    }

    #[test]
    fn coalesced_changes_keep_the_first_previous() {
        let first = Change::new(Some(json!({"a": 1, "b": 0})), smallvec![Key::from("a")], Some(json!(1)), Some(json!(0)));
        let second = Change::new(Some(json!({"a": 1, "b": 1})), smallvec![Key::from("b")], Some(json!(1)), Some(json!(0)));
        let merged = first.coalesce(&second);

        assert_eq!(merged.path(), &[Key::from("b")]);
        assert_eq!(merged.value(), Some(&json!({"a": 1, "b": 1})));
        assert_eq!(merged.previous(), Some(json!({"a": 0, "b": 0})));
    }

    #[test]
    fn collect_bubbles_with_growing_paths() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.get_child_node(root, Key::from("a")).unwrap();
        let b = arena.get_child_node(a, Key::from("b")).unwrap();
        arena.add_listener(root, Listener::new(false, |_| {}));
        arena.add_listener(a, Listener::new(true, |_| {}));
        arena.add_listener(b, Listener::new(false, |_| {}));

        let data = json!({"a": {"b": 2}});
        let change = PendingChange {
            node: b,
            value: Some(json!(2)),
            prev: Some(json!(1)),
            level: 0,
            bubble: true,
        };
        let mut out = Vec::new();
        collect(&arena, Some(&data), &change, &mut out);

        // The shallow listener on `a` is one level away and stays silent.
        assert_eq!(out.len(), 2);
        assert!(out[0].change().path().is_empty());
        assert_eq!(out[1].change().path(), &[Key::from("a"), Key::from("b")]);
        assert_eq!(out[1].change().value(), Some(&data));
        assert_eq!(out[1].change().prev_at_path(), Some(&json!(1)));
    }

    #[test]
    fn creations_reach_shallow_parents() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.get_child_node(root, Key::from("a")).unwrap();
        arena.add_listener(root, Listener::new(true, |_| {}));

        let change = PendingChange {
            node: a,
            value: Some(json!(1)),
            prev: None,
            level: -1,
            bubble: true,
        };
        let mut out = Vec::new();
        collect(&arena, Some(&json!({"a": 1})), &change, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn non_bubbling_changes_stop_at_their_node() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.get_child_node(root, Key::from("a")).unwrap();
        arena.add_listener(root, Listener::new(false, |_| {}));
        arena.add_listener(a, Listener::new(false, |_| {}));

        let change = PendingChange {
            node: a,
            value: Some(json!(1)),
            prev: Some(json!(0)),
            level: 0,
            bubble: false,
        };
        let mut out = Vec::new();
        collect(&arena, Some(&json!({"a": 1})), &change, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].change().path().is_empty());
    }
}
