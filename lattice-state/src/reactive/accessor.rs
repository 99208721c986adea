//! Typed Accessors
//!
//! [`NodeView`] classifies a node by the shape of its current value. Each
//! variant derefs to the underlying [`Observable`], so everything a handle
//! can do is available on the view, and adds the operations that only make
//! sense for that shape.
//!
//! The classification is a snapshot: a view taken while the node held an
//! array keeps offering array methods after the value is replaced by
//! something else. Take a fresh view after structural writes.

use std::ops::Deref;

use serde_json::Value;

use super::array::ArrayNode;
use super::context::TrackingContext;
use super::observable::{Observable, Read};
use crate::error::Result;
use crate::graph::Key;
use crate::value;

/// Read, write and iterate a node's children.
pub trait Accessor {
    /// The handle behind this accessor.
    fn handle(&self) -> &Observable;

    /// Read the child at `key`, tracking primitive reads in `cx`.
    fn read(&self, key: &Key, cx: Option<&TrackingContext>) -> Read {
        self.handle().read(key.clone(), cx)
    }

    /// Write the child at `key`.
    fn write(&self, key: &Key, value: Option<Value>) -> Result<Observable> {
        self.handle().try_set_key(key.clone(), value)
    }

    /// Read every child in iteration order.
    fn iterate(&self) -> Vec<(Key, Read)> {
        let keys = self.handle().get().map(|current| value::keys(&current)).unwrap_or_default();
        keys.into_iter()
            .map(|key| {
                let read = self.read(&key, None);
                (key, read)
            })
            .collect()
    }
}

/// A node, classified by its current value.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeView {
    /// A leaf, or a node whose value is absent.
    Primitive(PrimitiveNode),
    Object(ObjectNode),
    Array(ArrayNode),
}

impl NodeView {
    pub(crate) fn of(handle: Observable) -> Self {
        match handle.get() {
            Some(Value::Array(_)) => NodeView::Array(ArrayNode::new(handle)),
            Some(Value::Object(_)) => NodeView::Object(ObjectNode { handle }),
            _ => NodeView::Primitive(PrimitiveNode { handle }),
        }
    }

    /// Whether the node held a primitive or nothing.
    pub fn is_primitive(&self) -> bool {
        matches!(self, NodeView::Primitive(_))
    }
}

impl Accessor for NodeView {
    fn handle(&self) -> &Observable {
        match self {
            NodeView::Primitive(node) => node.handle(),
            NodeView::Object(node) => node.handle(),
            NodeView::Array(node) => node.handle(),
        }
    }

    fn iterate(&self) -> Vec<(Key, Read)> {
        match self {
            NodeView::Primitive(node) => node.iterate(),
            NodeView::Object(node) => node.iterate(),
            NodeView::Array(node) => node.iterate(),
        }
    }
}

impl Deref for NodeView {
    type Target = Observable;

    fn deref(&self) -> &Observable {
        self.handle()
    }
}

/// Accessor for a leaf value.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveNode {
    handle: Observable,
}

impl PrimitiveNode {
    /// The value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        self.handle.get()?.as_bool()
    }

    /// The value as a float, for any JSON number.
    pub fn as_f64(&self) -> Option<f64> {
        self.handle.get()?.as_f64()
    }

    /// The value as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.handle.get()?.as_i64()
    }

    /// The value as a string.
    pub fn as_string(&self) -> Option<String> {
        match self.handle.get()? {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the value is absent or null.
    pub fn is_empty(&self) -> bool {
        self.handle.get().map_or(true, |value| value.is_null())
    }
}

impl Accessor for PrimitiveNode {
    fn handle(&self) -> &Observable {
        &self.handle
    }

    fn iterate(&self) -> Vec<(Key, Read)> {
        Vec::new()
    }
}

impl Deref for PrimitiveNode {
    type Target = Observable;

    fn deref(&self) -> &Observable {
        &self.handle
    }
}

/// Accessor for an object value.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    handle: Observable,
}

impl ObjectNode {
    /// Property keys in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.handle.get().map(|current| value::keys(&current)).unwrap_or_default()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        match self.handle.get() {
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the object currently has `key`.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.handle
            .get()
            .is_some_and(|current| value::index(&current, &key).is_some())
    }

    /// Handles to every property.
    pub fn children(&self) -> Vec<Observable> {
        self.keys().into_iter().map(|key| self.handle.child(key)).collect()
    }
}

impl Accessor for ObjectNode {
    fn handle(&self) -> &Observable {
        &self.handle
    }
}

impl Deref for ObjectNode {
    type Target = Observable;

    fn deref(&self) -> &Observable {
        &self.handle
    }
}
