//! Array Accessor
//!
//! Mutators run against a copy of the current array, then write the result
//! back through the normal write path inside a batch. The diff pass sees the
//! whole new array, so element nodes keyed by `id` follow their elements and
//! listeners hear one change per call. Each mutator returns what the
//! corresponding `Vec` operation would.
//!
//! Loopers hand element handles to the callback instead of raw values, so
//! reads inside the callback can be tracked and elements subscribed to.

use std::cmp::Ordering;
use std::ops::{Bound, Deref, RangeBounds};

use serde_json::Value;

use super::accessor::Accessor;
use super::observable::Observable;
use crate::graph::Key;
use crate::value::{self, IntoValue};

/// Accessor for an array value.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    handle: Observable,
}

fn clamp_range(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end.saturating_add(1),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    (start.min(end), end)
}

impl ArrayNode {
    pub(crate) fn new(handle: Observable) -> Self {
        Self { handle }
    }

    /// Copy of the current elements; empty when the node is not an array.
    pub fn items(&self) -> Vec<Value> {
        match self.handle.get() {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle to the element at `index`.
    pub fn at(&self, index: usize) -> Observable {
        self.handle.child(Key::Index(index))
    }

    /// Run `f` on a copy of the elements and write the copy back.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let _batch = self.handle.begin_batch();
        let mut items = self.items();
        let result = f(&mut items);
        if let Err(err) = self.handle.try_set(Value::Array(items)) {
            tracing::debug!(%err, "array write rejected");
        }
        result
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Append an element, returning the new length.
    pub fn push(&self, item: impl IntoValue) -> usize {
        let item = item.into_value().unwrap_or(Value::Null);
        self.mutate(|items| {
            items.push(item);
            items.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(Vec::pop)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(|items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Insert elements at the front, returning the new length.
    pub fn unshift<I>(&self, new_items: I) -> usize
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        let new_items: Vec<Value> = new_items
            .into_iter()
            .map(|item| item.into_value().unwrap_or(Value::Null))
            .collect();
        self.mutate(|items| {
            let tail = std::mem::replace(items, new_items);
            items.extend(tail);
            items.len()
        })
    }

    /// Remove `delete_count` elements at `start`, insert `insert` in their
    /// place and return the removed elements. Out-of-range arguments are
    /// clamped.
    pub fn splice<I>(&self, start: usize, delete_count: usize, insert: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        let insert: Vec<Value> = insert
            .into_iter()
            .map(|item| item.into_value().unwrap_or(Value::Null))
            .collect();
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Sort with [`compare_values`](crate::value::compare_values).
    pub fn sort(&self) {
        self.mutate(|items| items.sort_by(value::compare_values));
    }

    /// Sort with a custom comparator. The sort is stable.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.mutate(|items| items.sort_by(compare));
    }

    /// Overwrite the elements in `range` with `item`.
    pub fn fill(&self, item: impl IntoValue, range: impl RangeBounds<usize>) {
        let item = item.into_value().unwrap_or(Value::Null);
        self.mutate(|items| {
            let (start, end) = clamp_range(range, items.len());
            for slot in &mut items[start..end] {
                *slot = item.clone();
            }
        });
    }

    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }

    /// Copy the elements in `source` to the position starting at `dest`.
    /// Elements that would land past the end are dropped.
    pub fn copy_within(&self, source: impl RangeBounds<usize>, dest: usize) {
        self.mutate(|items| {
            let (start, end) = clamp_range(source, items.len());
            let chunk: Vec<Value> = items[start..end].to_vec();
            for (offset, item) in chunk.into_iter().enumerate() {
                match items.get_mut(dest + offset) {
                    Some(slot) => *slot = item,
                    None => break,
                }
            }
        });
    }

    /// Replace every element with the items of `source`.
    pub fn set_from<I>(&self, source: I)
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        let source: Vec<Value> = source
            .into_iter()
            .map(|item| item.into_value().unwrap_or(Value::Null))
            .collect();
        self.mutate(|items| *items = source);
    }

    // ------------------------------------------------------------------
    // Loopers
    // ------------------------------------------------------------------

    /// Element handles in order.
    pub fn elements(&self) -> Vec<Observable> {
        (0..self.len()).map(|index| self.at(index)).collect()
    }

    pub fn map<R>(&self, mut f: impl FnMut(&Observable, usize) -> R) -> Vec<R> {
        self.elements()
            .iter()
            .enumerate()
            .map(|(index, element)| f(element, index))
            .collect()
    }

    pub fn filter(&self, mut f: impl FnMut(&Observable, usize) -> bool) -> Vec<Observable> {
        self.elements()
            .into_iter()
            .enumerate()
            .filter(|(index, element)| f(element, *index))
            .map(|(_, element)| element)
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Observable, usize)) {
        for (index, element) in self.elements().iter().enumerate() {
            f(element, index);
        }
    }

    pub fn some(&self, mut f: impl FnMut(&Observable, usize) -> bool) -> bool {
        self.elements()
            .iter()
            .enumerate()
            .any(|(index, element)| f(element, index))
    }

    pub fn every(&self, mut f: impl FnMut(&Observable, usize) -> bool) -> bool {
        self.elements()
            .iter()
            .enumerate()
            .all(|(index, element)| f(element, index))
    }
}

impl Accessor for ArrayNode {
    fn handle(&self) -> &Observable {
        &self.handle
    }
}

impl Deref for ArrayNode {
    type Target = Observable;

    fn deref(&self) -> &Observable {
        &self.handle
    }
}
