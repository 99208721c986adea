//! Diff Pass
//!
//! Every write runs inside a [`WriteScope`], which holds the tree's node
//! arena and raw value for the duration of the write. The scope is the only
//! way to obtain mutable access to the raw value, so nothing can change the
//! tree behind the diff engine's back.
//!
//! # Algorithm
//!
//! Setting key `k` on node `N` to a new value:
//!
//! 1. Resolve `N`'s live container, swap in the new value and keep the
//!    previous one.
//! 2. If the new value is a container, walk its keys against the previous
//!    value depth-first. Children that differ are recursed into first, and a
//!    child with its own listeners gets a change of its own. Array elements
//!    are skipped here since the array's change covers them.
//! 3. For arrays whose previous elements carry an `id`, a node whose element
//!    moved follows it to the new index instead of being recreated.
//! 4. Finally `N[k]` itself gets a change that bubbles to the root, unless it
//!    is a primitive equal to the previous value.
//!
//! The pass only records [`PendingChange`]s. Turning them into listener
//! notifications is the dispatch pass in the `notify` module.

use std::collections::HashMap;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLockWriteGuard;
use serde_json::{Map, Value};

use super::batch::Notification;
use super::notify;
use super::tree::{Tree, CURRENT};
use crate::error::{Result, StateError};
use crate::graph::{display_path, Key, Node, NodeArena, NodeId};
use crate::value;

/// One entry of the change-set produced by a write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingChange {
    /// Node whose value changed.
    pub(crate) node: NodeId,
    pub(crate) value: Option<Value>,
    pub(crate) prev: Option<Value>,
    /// 0 for an update, -1 when the key did not exist before.
    pub(crate) level: i32,
    /// Whether ancestors hear about the change too. Changes found while
    /// diffing a subtree only reach the child's own listeners.
    pub(crate) bubble: bool,
}

/// Exclusive access to a tree while a write is in progress.
pub(crate) struct WriteScope<'t> {
    tree: &'t Tree,
    nodes: RwLockWriteGuard<'t, NodeArena>,
    raw: RwLockWriteGuard<'t, Value>,
    changes: Vec<PendingChange>,
}

impl<'t> WriteScope<'t> {
    pub(crate) fn new(tree: &'t Tree) -> Self {
        Self {
            tree,
            nodes: tree.nodes.write(),
            raw: tree.value.write(),
            changes: Vec::new(),
        }
    }

    /// Set `key` under `parent`, returning the child node written to.
    ///
    /// Missing or `null` containers on the way are created. The write is
    /// then reported as the creation of the topmost of them, so the node
    /// that gained a key hears it as a change of its own shape.
    pub(crate) fn set_prop(&mut self, parent: NodeId, key: Key, new: Option<Value>) -> Result<NodeId> {
        let child = self
            .nodes
            .get_child_node(parent, key.clone())
            .ok_or(StateError::StaleNode)?;
        let path = self.nodes.path_of(parent).ok_or(StateError::StaleNode)?;

        let data = data_mut(&mut self.raw, self.tree.is_primitive());
        let created = first_missing(data, &path);
        if created.is_some() && new.is_none() {
            // Nothing to remove below a container that does not exist.
            return Ok(child);
        }
        let container = descend_mut(data, &path)?;
        let prev = value::put(container, &key, new.clone())
            .map_err(|err| err.at_path(display_path(&path)))?;

        match created {
            Some((depth, prev_top)) => self.record_created(child, path.len() + 1 - depth, prev_top),
            None => self.record(child, new, prev),
        }
        Ok(child)
    }

    /// Replace the whole root value.
    pub(crate) fn replace_root(&mut self, new: Option<Value>) {
        let prev = if self.tree.is_primitive() {
            if !self.raw.is_object() {
                *self.raw = Value::Object(Map::new());
            }
            match &mut *self.raw {
                Value::Object(boxed) => match new.clone() {
                    Some(next) => boxed.insert(CURRENT.to_owned(), next),
                    None => boxed.remove(CURRENT),
                },
                _ => None,
            }
        } else {
            Some(std::mem::replace(&mut *self.raw, new.clone().unwrap_or(Value::Null)))
        };
        self.record(NodeId::ROOT, new, prev);
    }

    /// Remove `key` from `parent`, notifying with an undefined value.
    ///
    /// A removal changes the parent's shape, so it is reported at level -1
    /// like a creation and reaches shallow listeners on the parent. The
    /// child node stays memoized at its path, so handles to it keep working
    /// and a later write recreates the key.
    pub(crate) fn delete_key(&mut self, parent: NodeId, key: Key) -> Result<()> {
        let child = self.set_prop(parent, key, None)?;
        if let Some(change) = self.changes.iter_mut().rev().find(|c| c.node == child && c.bubble) {
            change.level = -1;
        }
        Ok(())
    }

    /// The parent and key `id` occupies, or `None` for the root.
    pub(crate) fn slot_of(&self, id: NodeId) -> Result<Option<(NodeId, Key)>> {
        let node = self.nodes.get(id).ok_or(StateError::StaleNode)?;
        Ok(node.parent().zip(node.key().cloned()))
    }

    fn record(&mut self, node: NodeId, new: Option<Value>, prev: Option<Value>) {
        let structural = new.as_ref().is_some_and(|v| !value::is_primitive(v));
        if let Some(next) = new.as_ref().filter(|v| !value::is_primitive(v)) {
            update_nodes(&mut self.nodes, node, next, prev.as_ref(), &mut self.changes);
        }
        if structural || new != prev {
            let level = if prev.is_none() { -1 } else { 0 };
            self.changes.push(PendingChange {
                node,
                value: new,
                prev,
                level,
                bubble: true,
            });
        }
    }

    /// Record a write that created `steps` levels of containers above and
    /// including `child`'s parent.
    ///
    /// Listeners inside the new subtree hear their own creation; the change
    /// that bubbles starts at the topmost created node.
    fn record_created(&mut self, child: NodeId, steps: usize, prev_top: Option<Value>) {
        let data = self.tree.data(&self.raw);
        let mut id = child;
        for _ in 0..steps {
            if self.nodes.get(id).is_some_and(Node::has_listeners) {
                self.changes.push(PendingChange {
                    node: id,
                    value: self.nodes.resolve(id, data).cloned(),
                    prev: None,
                    level: -1,
                    bubble: false,
                });
            }
            match self.nodes.get(id).and_then(Node::parent) {
                Some(parent) => id = parent,
                None => break,
            }
        }
        self.changes.push(PendingChange {
            node: id,
            value: self.nodes.resolve(id, data).cloned(),
            prev: prev_top,
            level: -1,
            bubble: true,
        });
    }

    #[cfg(test)]
    pub(crate) fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    /// Build notifications for everything recorded and release the tree.
    pub(crate) fn commit(self) -> Vec<Notification> {
        let WriteScope {
            tree,
            nodes,
            raw,
            changes,
        } = self;
        let data = tree.data(&raw);
        let mut out = Vec::new();
        for change in &changes {
            notify::collect(&nodes, data, change, &mut out);
        }
        out
    }
}

/// The value paths resolve against, creating the primitive box slot.
fn data_mut(raw: &mut Value, is_primitive: bool) -> &mut Value {
    if !is_primitive {
        return raw;
    }
    if !raw.is_object() {
        *raw = Value::Object(Map::new());
    }
    match raw {
        Value::Object(boxed) => boxed.entry(CURRENT).or_insert(Value::Null),
        other => other,
    }
}

/// The depth of the first container along `path` that a write would have to
/// create, with its previous value (`null` or absent).
fn first_missing(data: &Value, path: &[Key]) -> Option<(usize, Option<Value>)> {
    if data.is_null() {
        return Some((0, Some(Value::Null)));
    }
    let mut current = data;
    for (depth, key) in path.iter().enumerate() {
        match value::index(current, key) {
            None => return Some((depth + 1, None)),
            Some(Value::Null) => return Some((depth + 1, Some(Value::Null))),
            Some(next) => current = next,
        }
    }
    None
}

/// Walk `path` below `data`, creating empty objects for missing steps.
fn descend_mut<'v>(data: &'v mut Value, path: &[Key]) -> Result<&'v mut Value> {
    let mut current = data;
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    for (depth, key) in path.iter().enumerate() {
        current = value::entry_mut(current, key).map_err(|err| err.at_path(display_path(&path[..depth])))?;
    }
    Ok(current)
}

fn entries(value: &Value) -> Vec<(Key, &Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (Key::Index(i), item))
            .collect(),
        Value::Object(map) => map.iter().map(|(k, v)| (Key::parse(k), v)).collect(),
        _ => Vec::new(),
    }
}

#[cfg(debug_assertions)]
fn warn_missing_id() {
    static WARNED: AtomicBool = AtomicBool::new(false);
    if !WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(
            "objects in observable arrays need a unique `id` field to keep their identity across reorders"
        );
    }
}

#[cfg(not(debug_assertions))]
fn warn_missing_id() {}

/// Diff `next` against `prev` below `parent`, recording changes for
/// children that have listeners.
pub(crate) fn update_nodes(
    nodes: &mut NodeArena,
    parent: NodeId,
    next: &Value,
    prev: Option<&Value>,
    changes: &mut Vec<PendingChange>,
) {
    let Some(prev) = prev.filter(|p| !p.is_null()) else {
        return;
    };
    let is_array = next.is_array();

    // id -> previous index, for identity tracking across reorders
    let prev_ids: Option<HashMap<String, usize>> = match (next, prev) {
        (Value::Array(_), Value::Array(prev_items)) if !prev_items.is_empty() => Some(
            prev_items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| item.get("id").map(|id| (id.to_string(), i)))
                .collect(),
        ),
        _ => None,
    };
    // Nodes pushed out of their slot by a moved element, by former index.
    let mut displaced: HashMap<usize, NodeId> = HashMap::new();

    for (key, item) in entries(next) {
        let prev_at = value::index(prev, &key);
        if prev_at == Some(item) {
            continue;
        }
        let Some(mut child) = nodes.get_child_node(parent, key.clone()) else {
            return;
        };
        let mut prev_for_child = prev_at;
        let is_obj = !value::is_primitive(item);

        if let (Some(prev_ids), true, Key::Index(index)) = (&prev_ids, is_obj, &key) {
            match item.get("id") {
                Some(id) => {
                    let moved_from = prev_ids.get(&id.to_string()).copied().filter(|from| from != index);
                    if let Some(from) = moved_from {
                        let existing = displaced
                            .remove(&from)
                            .or_else(|| nodes.get_child_node(parent, Key::Index(from)));
                        if let Some(existing) = existing {
                            displaced.insert(*index, child);
                            nodes.relocate(parent, existing, key.clone());
                            child = existing;
                            prev_for_child = value::index(prev, &Key::Index(from));
                        }
                    }
                }
                None => warn_missing_id(),
            }
        }

        if prev_for_child == Some(item) {
            continue;
        }
        if is_obj {
            update_nodes(nodes, child, item, prev_for_child, changes);
        }
        if !is_array && nodes.get(child).is_some_and(Node::has_listeners) {
            changes.push(PendingChange {
                node: child,
                value: Some(item.clone()),
                prev: prev_for_child.cloned(),
                level: 0,
                bubble: false,
            });
        }
    }

    for node in displaced.into_values() {
        let attached = nodes
            .get(node)
            .and_then(|n| n.key().cloned())
            .is_some_and(|key| nodes.child(parent, &key) == Some(node));
        if !attached {
            nodes.reclaim_unobserved(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Listener;
    use serde_json::json;

    fn listen(arena: &mut NodeArena, id: NodeId) {
        arena.add_listener(id, Listener::new(false, |_| {}));
    }

    #[test]
    fn only_children_with_listeners_get_changes() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.get_child_node(root, Key::from("a")).unwrap();
        let b = arena.get_child_node(a, Key::from("b")).unwrap();
        listen(&mut arena, b);

        let mut changes = Vec::new();
        update_nodes(
            &mut arena,
            root,
            &json!({"a": {"b": 2, "c": 3}}),
            Some(&json!({"a": {"b": 1, "c": 1}})),
            &mut changes,
        );

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].node, b);
        assert_eq!(changes[0].value, Some(json!(2)));
        assert_eq!(changes[0].prev, Some(json!(1)));
        assert!(!changes[0].bubble);
    }

    #[test]
    fn children_are_recorded_before_their_parents() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.get_child_node(root, Key::from("a")).unwrap();
        let b = arena.get_child_node(a, Key::from("b")).unwrap();
        listen(&mut arena, a);
        listen(&mut arena, b);

        let mut changes = Vec::new();
        update_nodes(&mut arena, root, &json!({"a": {"b": 2}}), Some(&json!({"a": {"b": 1}})), &mut changes);

        let order: Vec<_> = changes.iter().map(|c| c.node).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn equal_subtrees_are_skipped() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let a = arena.get_child_node(root, Key::from("a")).unwrap();
        listen(&mut arena, a);

        let mut changes = Vec::new();
        update_nodes(&mut arena, root, &json!({"a": {"b": 1}}), Some(&json!({"a": {"b": 1}})), &mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn array_elements_are_not_notified_directly() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let first = arena.get_child_node(root, Key::Index(0)).unwrap();
        listen(&mut arena, first);

        let mut changes = Vec::new();
        update_nodes(&mut arena, root, &json!([2]), Some(&json!([1])), &mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn reordered_elements_keep_their_nodes() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let first = arena.get_child_node(root, Key::Index(0)).unwrap();
        let second = arena.get_child_node(root, Key::Index(1)).unwrap();
        listen(&mut arena, first);
        listen(&mut arena, second);

        let mut changes = Vec::new();
        update_nodes(
            &mut arena,
            root,
            &json!([{"id": 2, "v": "b"}, {"id": 1, "v": "a"}]),
            Some(&json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}])),
            &mut changes,
        );

        assert!(changes.is_empty());
        assert_eq!(arena.child(root, &Key::Index(0)), Some(second));
        assert_eq!(arena.child(root, &Key::Index(1)), Some(first));
        assert_eq!(arena.get(first).unwrap().key(), Some(&Key::Index(1)));
    }

    #[test]
    fn moved_element_diffs_against_its_old_value() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let first = arena.get_child_node(root, Key::Index(0)).unwrap();
        let name = arena.get_child_node(first, Key::from("v")).unwrap();
        listen(&mut arena, name);

        let mut changes = Vec::new();
        update_nodes(
            &mut arena,
            root,
            &json!([{"id": 2}, {"id": 1, "v": "changed"}]),
            Some(&json!([{"id": 1, "v": "a"}, {"id": 2}])),
            &mut changes,
        );

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].node, name);
        assert_eq!(changes[0].prev, Some(json!("a")));
        assert_eq!(changes[0].value, Some(json!("changed")));
    }

    #[test]
    fn elements_without_ids_diff_by_position() {
        let mut arena = NodeArena::new();
        let root = arena.root();
        let first = arena.get_child_node(root, Key::Index(0)).unwrap();
        let name = arena.get_child_node(first, Key::from("v")).unwrap();
        listen(&mut arena, name);

        let mut changes = Vec::new();
        update_nodes(
            &mut arena,
            root,
            &json!([{"v": "b"}, {"v": "a"}]),
            Some(&json!([{"v": "a"}, {"v": "b"}])),
            &mut changes,
        );

        // The node at index 0 stays put and sees the value now found there.
        assert_eq!(arena.child(root, &Key::Index(0)), Some(first));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].node, name);
        assert_eq!(changes[0].prev, Some(json!("a")));
        assert_eq!(changes[0].value, Some(json!("b")));
    }

    #[test]
    fn created_parents_are_reported_from_the_topmost() {
        let tree = Tree::new(Some(json!({})));
        let mut scope = WriteScope::new(&tree);
        let deep = scope.set_prop(NodeId::ROOT, Key::from("deep"), None).unwrap();
        assert!(scope.changes().is_empty());

        let er = scope.set_prop(deep, Key::from("er"), Some(json!("x"))).unwrap();
        assert_eq!(
            scope.changes(),
            &[PendingChange {
                node: deep,
                value: Some(json!({"er": "x"})),
                prev: None,
                level: -1,
                bubble: true,
            }]
        );
        assert_ne!(er, deep);
    }

    #[test]
    fn created_nodes_with_listeners_hear_their_creation() {
        let tree = Tree::new(Some(json!({"a": null})));
        let mut scope = WriteScope::new(&tree);
        let a = scope.set_prop(NodeId::ROOT, Key::from("a"), Some(Value::Null)).unwrap();
        let b = scope.nodes.get_child_node(a, Key::from("b")).unwrap();
        listen(&mut scope.nodes, b);

        scope.set_prop(b, Key::from("c"), Some(json!(1))).unwrap();
        let recorded: Vec<_> = scope.changes().iter().map(|c| (c.node, c.prev.clone(), c.bubble)).collect();
        assert_eq!(recorded, vec![(b, None, false), (a, Some(Value::Null), true)]);
    }

    #[test]
    fn deleting_below_a_missing_parent_writes_nothing() {
        let tree = Tree::new(Some(json!({})));
        let mut scope = WriteScope::new(&tree);
        let a = scope.set_prop(NodeId::ROOT, Key::from("a"), None).unwrap();
        scope.delete_key(a, Key::from("b")).unwrap();
        assert!(scope.changes().is_empty());
        drop(scope);
        assert_eq!(*tree.value.read(), json!({}));
    }

    #[test]
    fn new_keys_are_creations() {
        let tree = Tree::new(Some(json!({"a": 1})));
        let mut scope = WriteScope::new(&tree);
        scope.set_prop(NodeId::ROOT, Key::from("b"), Some(json!(2))).unwrap();
        scope.set_prop(NodeId::ROOT, Key::from("a"), Some(json!(3))).unwrap();

        let levels: Vec<_> = scope.changes().iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![-1, 0]);
    }

    #[test]
    fn unchanged_primitives_record_nothing() {
        let tree = Tree::new(Some(json!({"a": 1})));
        let mut scope = WriteScope::new(&tree);
        scope.set_prop(NodeId::ROOT, Key::from("a"), Some(json!(1))).unwrap();
        assert!(scope.changes().is_empty());

        // Containers always notify.
        scope.set_prop(NodeId::ROOT, Key::from("b"), Some(json!({}))).unwrap();
        scope.set_prop(NodeId::ROOT, Key::from("b"), Some(json!({}))).unwrap();
        assert_eq!(scope.changes().len(), 2);
    }

    #[test]
    fn writes_create_missing_intermediates() {
        let tree = Tree::new(Some(json!({})));
        let mut scope = WriteScope::new(&tree);
        let a = scope.set_prop(NodeId::ROOT, Key::from("a"), None).unwrap();
        scope.set_prop(a, Key::from("b"), Some(json!(1))).unwrap();
        drop(scope);
        assert_eq!(*tree.value.read(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn writes_into_primitives_are_rejected() {
        let tree = Tree::new(Some(json!({"a": 5})));
        let mut scope = WriteScope::new(&tree);
        let a = scope.set_prop(NodeId::ROOT, Key::from("a"), Some(json!(5))).unwrap();
        let err = scope.set_prop(a, Key::from("b"), Some(json!(1))).unwrap_err();
        assert!(matches!(err, StateError::NotAContainer { ref path, .. } if path == "a"));
    }

    #[test]
    fn deletions_reach_the_parent_level() {
        let tree = Tree::new(Some(json!({"a": 1})));
        let mut scope = WriteScope::new(&tree);
        scope.delete_key(NodeId::ROOT, Key::from("a")).unwrap();

        assert_eq!(scope.changes().len(), 1);
        assert_eq!(scope.changes()[0].level, -1);
        assert_eq!(scope.changes()[0].value, None);
        assert_eq!(scope.changes()[0].prev, Some(json!(1)));
    }

    #[test]
    fn root_has_no_slot() {
        let tree = Tree::new(Some(json!({"a": 1})));
        let mut scope = WriteScope::new(&tree);
        let a = scope.set_prop(NodeId::ROOT, Key::from("a"), Some(json!(2))).unwrap();
        assert_eq!(scope.slot_of(NodeId::ROOT).unwrap(), None);
        assert_eq!(scope.slot_of(a).unwrap(), Some((NodeId::ROOT, Key::from("a"))));
        assert!(matches!(scope.slot_of(NodeId::DANGLING), Err(StateError::StaleNode)));
    }

    #[test]
    fn primitive_roots_write_into_the_box() {
        let tree = Tree::new(Some(json!(5)));
        let mut scope = WriteScope::new(&tree);
        scope.replace_root(Some(json!(6)));
        assert_eq!(scope.changes()[0].prev, Some(json!(5)));
        assert_eq!(scope.changes()[0].node, NodeId::ROOT);
        drop(scope);
        assert_eq!(*tree.value.read(), json!({"current": 6}));
    }
}
