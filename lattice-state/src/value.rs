//! Raw Value Helpers
//!
//! Observable trees wrap a `serde_json::Value`. "Undefined" is modeled as
//! `None`, so every lookup here returns an `Option`.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::{Result, StateError};
use crate::graph::Key;
use crate::reactive::Observable;

/// Whether a value is a leaf (anything but an object or array).
pub fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

/// Index a container by key. Returns `None` for missing keys and for
/// primitives.
pub fn index<'v>(value: &'v Value, key: &Key) -> Option<&'v Value> {
    match (value, key) {
        (Value::Object(map), key) => map.get(&*key.as_property()),
        (Value::Array(items), Key::Index(i)) => items.get(*i),
        _ => None,
    }
}

/// Step into `key`, creating an empty object in its place if the slot is
/// missing or `null`.
pub(crate) fn entry_mut<'v>(value: &'v mut Value, key: &Key) -> Result<&'v mut Value> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    let slot = match (value, key) {
        (Value::Object(map), key) => map
            .entry(key.as_property().into_owned())
            .or_insert(Value::Null),
        (Value::Array(items), Key::Index(i)) => {
            grow(items, *i)?;
            &mut items[*i]
        }
        (Value::Array(_), Key::Name(name)) => {
            return Err(StateError::InvalidArrayKey { key: name.clone() })
        }
        (_, key) => {
            return Err(StateError::NotAContainer {
                path: String::new(),
                key: key.clone(),
            })
        }
    };
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    Ok(slot)
}

/// Write `new` into `container[key]`, returning the previous value.
///
/// `None` removes an object key; for arrays it leaves `null` behind so
/// later indices keep their position.
pub(crate) fn put(container: &mut Value, key: &Key, new: Option<Value>) -> Result<Option<Value>> {
    match container {
        Value::Object(map) => {
            let property = key.as_property().into_owned();
            Ok(match new {
                Some(value) => map.insert(property, value),
                None => map.remove(&property),
            })
        }
        Value::Array(items) => {
            let i = match key {
                Key::Index(i) => *i,
                Key::Name(name) => return Err(StateError::InvalidArrayKey { key: name.clone() }),
            };
            if i < items.len() {
                let replacement = new.unwrap_or(Value::Null);
                Ok(Some(std::mem::replace(&mut items[i], replacement)))
            } else {
                if let Some(value) = new {
                    grow(items, i)?;
                    items[i] = value;
                }
                Ok(None)
            }
        }
        _ => Err(StateError::NotAContainer {
            path: String::new(),
            key: key.clone(),
        }),
    }
}

/// Pad `items` with `null` so that `index` is in bounds.
///
/// Fails instead of aborting when the padding cannot be allocated.
fn grow(items: &mut Vec<Value>, index: usize) -> Result<()> {
    if index < items.len() {
        return Ok(());
    }
    let len = items.len();
    let out_of_range = || StateError::IndexOutOfRange { index, len };
    let end = index.checked_add(1).ok_or_else(out_of_range)?;
    items.try_reserve(end - len).map_err(|_| out_of_range())?;
    items.resize(end, Value::Null);
    Ok(())
}

/// Keys of a container in iteration order.
pub(crate) fn keys(value: &Value) -> Vec<Key> {
    match value {
        Value::Object(map) => map.keys().map(|k| Key::parse(k)).collect(),
        Value::Array(items) => (0..items.len()).map(Key::Index).collect(),
        _ => Vec::new(),
    }
}

/// Total order used by [`ArrayNode::sort`](crate::reactive::ArrayNode::sort).
///
/// Nulls first, then booleans, numbers, strings, arrays and objects.
/// Numbers compare numerically, strings lexically; containers of the same
/// kind compare by their JSON text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Conversion into a value written through an observable.
///
/// Wrapped handles unwrap to their current value, so writing one
/// observable into another copies the data rather than linking the trees.
pub trait IntoValue {
    /// Convert into the written value; `None` writes "undefined".
    fn into_value(self) -> Option<Value>;
}

impl IntoValue for Value {
    fn into_value(self) -> Option<Value> {
        Some(self)
    }
}

impl IntoValue for &Value {
    fn into_value(self) -> Option<Value> {
        Some(self.clone())
    }
}

impl IntoValue for Option<Value> {
    fn into_value(self) -> Option<Value> {
        self
    }
}

impl IntoValue for &Observable {
    fn into_value(self) -> Option<Value> {
        self.get()
    }
}

impl IntoValue for Observable {
    fn into_value(self) -> Option<Value> {
        self.get()
    }
}

macro_rules! into_value_via_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Option<Value> {
                    Some(Value::from(self))
                }
            }
        )*
    };
}

into_value_via_from!(bool, i32, i64, u32, u64, usize, f32, f64, &str, String);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_handles_numeric_object_keys() {
        let value = json!({"3": "x", "a": [10, 20]});
        assert_eq!(index(&value, &Key::Index(3)), Some(&json!("x")));
        let items = index(&value, &Key::from("a")).unwrap();
        assert_eq!(index(items, &Key::Index(1)), Some(&json!(20)));
        assert_eq!(index(items, &Key::Index(5)), None);
        assert_eq!(index(&json!(5), &Key::from("a")), None);
    }

    #[test]
    fn put_returns_previous_and_pads_arrays() {
        let mut value = json!([1]);
        assert_eq!(put(&mut value, &Key::Index(3), Some(json!(4))).unwrap(), None);
        assert_eq!(value, json!([1, null, null, 4]));
        assert_eq!(put(&mut value, &Key::Index(0), None).unwrap(), Some(json!(1)));
        assert_eq!(value, json!([null, null, null, 4]));
    }

    #[test]
    fn oversized_indices_are_rejected() {
        let mut value = json!([1]);
        for index in [usize::MAX, usize::MAX / 2] {
            assert!(matches!(
                put(&mut value, &Key::Index(index), Some(json!(2))),
                Err(StateError::IndexOutOfRange { len: 1, .. })
            ));
            assert!(matches!(
                entry_mut(&mut value, &Key::Index(index)),
                Err(StateError::IndexOutOfRange { .. })
            ));
        }
        assert_eq!(value, json!([1]));
    }

    #[test]
    fn put_removes_object_keys() {
        let mut value = json!({"a": 1, "b": 2});
        assert_eq!(put(&mut value, &Key::from("a"), None).unwrap(), Some(json!(1)));
        assert_eq!(value, json!({"b": 2}));
    }

    #[test]
    fn put_rejects_non_containers() {
        let mut value = json!(5);
        assert!(matches!(
            put(&mut value, &Key::from("a"), Some(json!(1))),
            Err(StateError::NotAContainer { .. })
        ));
        let mut items = json!([]);
        assert!(matches!(
            put(&mut items, &Key::from("length"), Some(json!(1))),
            Err(StateError::InvalidArrayKey { .. })
        ));
    }

    #[test]
    fn entry_creates_missing_objects() {
        let mut value = json!({});
        let slot = entry_mut(&mut value, &Key::from("a")).unwrap();
        assert!(slot.is_object());
        assert_eq!(value, json!({"a": {}}));
    }

    #[test]
    fn values_sort_by_kind_then_content() {
        let mut items = vec![json!("b"), json!(10), json!(null), json!(2), json!("a"), json!(true)];
        items.sort_by(compare_values);
        assert_eq!(items, vec![json!(null), json!(true), json!(2), json!(10), json!("a"), json!("b")]);
    }
}
