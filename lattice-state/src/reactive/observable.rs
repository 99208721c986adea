//! Observable Handles
//!
//! An [`Observable`] is the caller-facing view of one node: a shared
//! reference to the tree plus the node's id. Handles are cheap to clone and
//! compare equal when they name the same node of the same tree, so repeated
//! access to a path always yields an equal handle.
//!
//! Reads resolve against the live value on every call. Writes go through the
//! tree's write scope, which runs the diff pass and then dispatches (or, in a
//! batch, queues) the resulting notifications.
//!
//! # Example
//!
//! ```rust,ignore
//! let state = observable(json!({"count": 0}));
//!
//! let _disposer = state.on_change(|change| {
//!     println!("{:?} -> {:?}", change.prev_at_path(), change.value_at_path());
//! });
//!
//! state.child("count").set(5);
//! ```

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::accessor::{NodeView, ObjectNode};
use super::array::ArrayNode;
use super::batch::BatchGuard;
use super::context::TrackingContext;
use super::notify::Change;
use super::on;
use super::subscriber::{Callback, Disposer, Listener, ListenerId};
use super::tree::Tree;
use crate::error::Result;
use crate::graph::{display_path, Key, NodeId, Path};
use crate::value::{self, IntoValue};

/// Wrap `initial` in a new observable tree and return its root handle.
pub fn observable(initial: impl IntoValue) -> Observable {
    Observable::new(initial)
}

/// Result of reading a key through a handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Read {
    /// A primitive, or `None` when the key is absent.
    Value(Option<Value>),
    /// An object or array, returned as a handle to its node.
    Node(Observable),
}

impl Read {
    /// The value read, unwrapping node handles.
    pub fn value(&self) -> Option<Value> {
        match self {
            Read::Value(value) => value.clone(),
            Read::Node(node) => node.get(),
        }
    }

    /// The node handle, if the key held a container.
    pub fn as_node(&self) -> Option<&Observable> {
        match self {
            Read::Node(node) => Some(node),
            Read::Value(_) => None,
        }
    }
}

/// Handle to one node of an observable tree.
#[derive(Clone)]
pub struct Observable {
    tree: Arc<Tree>,
    id: NodeId,
}

impl Observable {
    /// Create a new tree holding `initial`.
    pub fn new(initial: impl IntoValue) -> Self {
        Self {
            tree: Arc::new(Tree::new(initial.into_value())),
            id: NodeId::ROOT,
        }
    }

    /// Create a new tree from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(initial: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(initial)?))
    }

    pub(crate) fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    fn with_id(&self, id: NodeId) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            id,
        }
    }

    /// The node this handle names.
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The current value, with primitive roots unwrapped. `None` when the
    /// path does not resolve.
    pub fn get(&self) -> Option<Value> {
        self.tree.resolve(self.id)
    }

    /// [`get`](Self::get), recording this node as a dependency of `cx`.
    pub fn get_tracked(&self, cx: &TrackingContext) -> Option<Value> {
        cx.track(self);
        self.get()
    }

    /// Record this node as a dependency of `cx` without reading it.
    pub fn track(&self, cx: &TrackingContext) -> &Self {
        cx.track(self);
        self
    }

    /// Deserialize the current value. An absent value deserializes from
    /// `null`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.get().unwrap_or(Value::Null))?)
    }

    /// Handle to the child at `key`.
    ///
    /// The child node is created on first access whether or not the key
    /// exists yet. A handle taken from a reclaimed node yields another
    /// stale handle.
    pub fn child(&self, key: impl Into<Key>) -> Observable {
        let id = self
            .tree
            .nodes
            .write()
            .get_child_node(self.id, key.into())
            .unwrap_or(NodeId::DANGLING);
        self.with_id(id)
    }

    /// Handle to the node at `path` below this one.
    pub fn at<K: Clone + Into<Key>>(&self, path: &[K]) -> Observable {
        path.iter().fold(self.clone(), |node, key| node.child(key.clone()))
    }

    /// Read `key`: primitives come back as values, containers as handles.
    ///
    /// With a tracking context, a primitive read records the child as a
    /// dependency. Container handles are tracked once they are read.
    pub fn read(&self, key: impl Into<Key>, cx: Option<&TrackingContext>) -> Read {
        let child = self.child(key);
        match child.get() {
            Some(found) if !value::is_primitive(&found) => Read::Node(child),
            found => {
                if let Some(cx) = cx {
                    cx.track(&child);
                }
                Read::Value(found)
            }
        }
    }

    /// The key this node occupies under its parent.
    pub fn key(&self) -> Option<Key> {
        self.tree.nodes.read().get(self.id)?.key().cloned()
    }

    /// Handle to the containing node.
    pub fn parent(&self) -> Option<Observable> {
        let parent = self.tree.nodes.read().get(self.id)?.parent()?;
        Some(self.with_id(parent))
    }

    /// Keys from the root down to this node. Empty for the root and for
    /// stale handles.
    pub fn path(&self) -> Path {
        self.tree.nodes.read().path_of(self.id).unwrap_or_default()
    }

    /// Whether this is the root handle of its tree.
    pub fn is_root(&self) -> bool {
        self.id == NodeId::ROOT
    }

    /// Whether the node is still part of its tree.
    pub fn is_attached(&self) -> bool {
        self.tree.nodes.read().contains(self.id)
    }

    /// Whether the tree was created from a primitive.
    pub fn is_primitive_root(&self) -> bool {
        self.tree.is_primitive()
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Typed accessor for the node, chosen by the shape of its current value.
    pub fn view(&self) -> NodeView {
        NodeView::of(self.clone())
    }

    /// Object accessor, if the node currently holds an object.
    pub fn as_object(&self) -> Option<ObjectNode> {
        match self.view() {
            NodeView::Object(node) => Some(node),
            _ => None,
        }
    }

    /// Array accessor, if the node currently holds an array.
    pub fn as_array(&self) -> Option<ArrayNode> {
        match self.view() {
            NodeView::Array(node) => Some(node),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Set this node's value. Out-of-contract writes are ignored.
    ///
    /// On the root of an object tree, an object value is assigned key by key
    /// rather than replacing the root.
    pub fn set(&self, value: impl IntoValue) -> Observable {
        if let Err(err) = self.try_set(value) {
            self.rejected(&err);
        }
        self.clone()
    }

    /// [`set`](Self::set), reporting why a write was rejected.
    pub fn try_set(&self, value: impl IntoValue) -> Result<Observable> {
        let value = value.into_value();
        if self.is_root() && !self.tree.is_primitive() && matches!(value, Some(Value::Object(_))) {
            self.try_assign(value)?;
            return Ok(self.clone());
        }
        self.tree.write(|scope| match scope.slot_of(self.id)? {
            Some((parent, key)) => scope.set_prop(parent, key, value).map(|_| ()),
            None => {
                scope.replace_root(value);
                Ok(())
            }
        })?;
        Ok(self.clone())
    }

    /// Set `key` under this node, returning the child's handle.
    pub fn set_key(&self, key: impl Into<Key>, value: impl IntoValue) -> Observable {
        let key = key.into();
        match self.try_set_key(key.clone(), value) {
            Ok(child) => child,
            Err(err) => {
                self.rejected(&err);
                self.child(key)
            }
        }
    }

    /// [`set_key`](Self::set_key), reporting why a write was rejected.
    pub fn try_set_key(&self, key: impl Into<Key>, value: impl IntoValue) -> Result<Observable> {
        let (key, value) = (key.into(), value.into_value());
        let id = self.tree.write(|scope| scope.set_prop(self.id, key, value))?;
        Ok(self.with_id(id))
    }

    /// Write every key of `partial` onto this node as one batched update.
    /// Returns the node's value afterwards.
    ///
    /// Anything but an object is ignored.
    pub fn assign(&self, partial: impl IntoValue) -> Option<Value> {
        match self.try_assign(partial) {
            Ok(value) => value,
            Err(err) => {
                self.rejected(&err);
                self.get()
            }
        }
    }

    /// [`assign`](Self::assign), reporting why a write was rejected.
    pub fn try_assign(&self, partial: impl IntoValue) -> Result<Option<Value>> {
        let Some(Value::Object(entries)) = partial.into_value() else {
            return Ok(self.get());
        };
        let batch = self.begin_batch();
        let written = self.tree.write(|scope| {
            for (key, value) in entries {
                scope.set_prop(self.id, Key::parse(&key), Some(value))?;
            }
            Ok(())
        });
        drop(batch);
        written?;
        Ok(self.get())
    }

    /// Remove this node's key from its parent. Deleting the root does
    /// nothing.
    ///
    /// The handle stays valid: reading it gives `None` and writing through it
    /// recreates the key. Listeners run after the key has been removed, so
    /// reading the parent from inside one no longer shows it; the removed
    /// value is in [`Change::prev_at_path`] and [`Change::previous`].
    pub fn delete(&self) {
        if let Err(err) = self.try_delete() {
            self.rejected(&err);
        }
    }

    /// [`delete`](Self::delete), reporting why a write was rejected.
    pub fn try_delete(&self) -> Result<()> {
        self.tree.write(|scope| match scope.slot_of(self.id)? {
            Some((parent, key)) => scope.delete_key(parent, key),
            None => Ok(()),
        })
    }

    /// Remove `key` from this node.
    ///
    /// Listeners see the key's value become `None`. The key is already gone
    /// from the container when they run: `self.get()` inside a listener does
    /// not contain it, and the old value is only available through
    /// [`Change::prev_at_path`] and [`Change::previous`].
    pub fn delete_key(&self, key: impl Into<Key>) {
        if let Err(err) = self.try_delete_key(key) {
            self.rejected(&err);
        }
    }

    /// [`delete_key`](Self::delete_key), reporting why a write was rejected.
    pub fn try_delete_key(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.tree.write(|scope| scope.delete_key(self.id, key))
    }

    /// Replace the value outright, bypassing root assignment.
    pub(crate) fn replace(&self, value: Option<Value>) -> Result<()> {
        self.tree.write(|scope| match scope.slot_of(self.id)? {
            Some((parent, key)) => scope.set_prop(parent, key, value).map(|_| ()),
            None => {
                scope.replace_root(value);
                Ok(())
            }
        })
    }

    fn rejected(&self, err: &crate::error::StateError) {
        tracing::debug!(path = %display_path(&self.path()), %err, "write rejected");
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Listen for changes at this node or anywhere below it.
    pub fn on_change<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.listen(false, Arc::new(callback))
    }

    /// Listen for changes to this node itself, including keys being added
    /// or removed, but not changes inside its children.
    pub fn on_change_shallow<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.listen(true, Arc::new(callback))
    }

    /// Run `callback` once, as soon as the value equals `target`.
    pub fn on_equals<F>(&self, target: impl Into<Value>, callback: F) -> Disposer
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let target = target.into();
        on::once_when(self, move |value| *value == target, callback)
    }

    /// Run `callback` once, as soon as the value is neither absent nor null.
    pub fn on_has_value<F>(&self, callback: F) -> Disposer
    where
        F: FnOnce(Value) + Send + 'static,
    {
        on::once_when(self, |value| !value.is_null(), callback)
    }

    /// Run `callback` once, as soon as the value is `true`.
    pub fn on_true<F>(&self, callback: F) -> Disposer
    where
        F: FnOnce(Value) + Send + 'static,
    {
        on::once_when(self, |value| *value == Value::Bool(true), callback)
    }

    pub(crate) fn listen(&self, shallow: bool, callback: Callback) -> Disposer {
        self.listen_as(ListenerId::new(), shallow, callback)
    }

    /// Register `callback` under an id that may be shared with listeners on
    /// other nodes.
    pub(crate) fn listen_as(&self, id: ListenerId, shallow: bool, callback: Callback) -> Disposer {
        let listener = Listener::with_id(id, shallow, callback);
        if self.tree.nodes.write().add_listener(self.id, listener) {
            Disposer::new(&self.tree, self.id, id)
        } else {
            Disposer::inert()
        }
    }

    /// Number of listeners registered on this node.
    pub fn listener_count(&self) -> usize {
        self.tree
            .nodes
            .read()
            .get(self.id)
            .map_or(0, |node| node.listener_count())
    }

    // ------------------------------------------------------------------
    // Batching and flags
    // ------------------------------------------------------------------

    /// Run `f` inside a batch on this tree.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.begin_batch();
        f()
    }

    /// Open a batch on this tree; it ends when the guard drops.
    pub fn begin_batch(&self) -> BatchGuard {
        BatchGuard::new(Arc::clone(&self.tree))
    }

    /// Set the tree-wide lock flag.
    pub fn lock(&self, locked: bool) {
        self.tree.set_locked(locked);
    }

    /// Whether the tree-wide lock flag is set.
    pub fn is_locked(&self) -> bool {
        self.tree.is_locked()
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for Observable {}

impl Hash for Observable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.tree).hash(state);
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("path", &display_path(&self.path()))
            .field("node", &self.id)
            .field("value", &self.get())
            .finish()
    }
}
