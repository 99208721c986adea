//! Free helpers over observables and plain values.

use serde_json::{Map, Value};

use crate::graph::Key;
use crate::reactive::Observable;

/// A source for [`merge_into_observable`] and [`merge_into_value`].
#[derive(Debug, Clone)]
pub enum MergeSource {
    Value(Value),
    Observable(Observable),
}

impl MergeSource {
    fn into_value(self) -> Option<Value> {
        match self {
            MergeSource::Value(value) => Some(value),
            MergeSource::Observable(observable) => observable.get(),
        }
    }
}

impl From<Value> for MergeSource {
    fn from(value: Value) -> Self {
        MergeSource::Value(value)
    }
}

impl From<&Value> for MergeSource {
    fn from(value: &Value) -> Self {
        MergeSource::Value(value.clone())
    }
}

impl From<Observable> for MergeSource {
    fn from(observable: Observable) -> Self {
        MergeSource::Observable(observable)
    }
}

impl From<&Observable> for MergeSource {
    fn from(observable: &Observable) -> Self {
        MergeSource::Observable(observable.clone())
    }
}

/// Deep-merge each source into `target`, in order, as one batched update.
///
/// Nested objects are merged key by key; anything else, arrays included,
/// overwrites the target's value. A source that is not an object, or a
/// target that does not hold one, is skipped.
pub fn merge_into_observable<I>(target: &Observable, sources: I) -> Observable
where
    I: IntoIterator,
    I::Item: Into<MergeSource>,
{
    let _batch = target.begin_batch();
    for source in sources {
        if let Some(Value::Object(source)) = source.into().into_value() {
            merge_object_into_observable(target, source);
        }
    }
    target.clone()
}

fn merge_object_into_observable(target: &Observable, source: Map<String, Value>) {
    if !matches!(target.get(), Some(Value::Object(_))) {
        return;
    }
    for (key, value) in source {
        let child = target.child(Key::parse(&key));
        match value {
            Value::Object(nested) => {
                if !matches!(child.get(), Some(Value::Object(_))) {
                    child.set(Value::Object(Map::new()));
                }
                merge_object_into_observable(&child, nested);
            }
            other => {
                child.set(other);
            }
        }
    }
}

/// Deep-merge each source into a plain value, in order, with the same rules
/// as [`merge_into_observable`].
pub fn merge_into_value<I>(target: &mut Value, sources: I)
where
    I: IntoIterator,
    I::Item: Into<MergeSource>,
{
    for source in sources {
        if let Some(Value::Object(source)) = source.into().into_value() {
            merge_object_into_value(target, source);
        }
    }
}

fn merge_object_into_value(target: &mut Value, source: Map<String, Value>) {
    let Value::Object(target) = target else {
        return;
    };
    for (key, value) in source {
        match value {
            Value::Object(nested) => {
                let slot = target.entry(key).or_insert(Value::Null);
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                merge_object_into_value(slot, nested);
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}

/// Set the tree-wide lock flag of the tree `observable` belongs to.
pub fn lock_observable(observable: &Observable, locked: bool) {
    observable.lock(locked);
}
