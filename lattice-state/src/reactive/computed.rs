//! Computed Observables
//!
//! A computed observable holds a value derived from other observables. An
//! observer re-evaluates the derivation whenever one of the nodes it read
//! changes, and writes the result into the computed tree, which notifies
//! its own listeners.
//!
//! Unlike a lattice memo, evaluation is eager: the derivation runs when a
//! dependency changes, not when the value is next read. An evaluation that
//! produces the current value again leaves the computed tree untouched, so
//! downstream listeners only hear about real changes.

use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::context::TrackingContext;
use super::observe::{observe, Observer};
use super::Observable;

/// A derived observable, kept current by an observer.
///
/// Dropping the last `Computed` stops updates.
pub struct Computed {
    value: Observable,
    observer: Observer,
}

/// Create an observable whose value is `compute`, re-evaluated whenever a
/// node read through the tracking context changes.
///
/// # Example
///
/// ```rust,ignore
/// let state = observable(json!({"a": 1, "b": 2}));
/// let source = state.clone();
/// let sum = computed(move |cx| {
///     let a = source.child("a").get_tracked(cx).and_then(|v| v.as_i64()).unwrap_or(0);
///     let b = source.child("b").get_tracked(cx).and_then(|v| v.as_i64()).unwrap_or(0);
///     json!(a + b)
/// });
/// assert_eq!(sum.get(), Some(json!(3)));
/// ```
pub fn computed<F>(compute: F) -> Computed
where
    F: Fn(&TrackingContext) -> Value + Send + Sync + 'static,
{
    let slot: Arc<OnceLock<Observable>> = Arc::new(OnceLock::new());
    let target = Arc::clone(&slot);

    let observer = observe(move |cx| {
        let next = compute(cx);
        match target.get() {
            Some(value) => {
                if value.get().as_ref() == Some(&next) {
                    return;
                }
                if let Err(err) = value.replace(Some(next)) {
                    tracing::debug!(%err, "computed update rejected");
                }
            }
            None => {
                let _ = target.set(Observable::new(next));
            }
        }
    });

    // The first run always fills the slot.
    let value = slot.get().cloned().unwrap_or_else(|| Observable::new(Value::Null));
    Computed { value, observer }
}

impl Computed {
    /// The observer keeping this value current.
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    /// Stop re-evaluating. The last value stays readable.
    pub fn dispose(&self) {
        self.observer.dispose();
    }
}

impl Deref for Computed {
    type Target = Observable;

    fn deref(&self) -> &Observable {
        &self.value
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.value.get())
            .field("observer", &self.observer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observable;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn sum_of(state: &Observable) -> Computed {
        let source = state.clone();
        computed(move |cx| {
            let read = |key: &str| {
                source
                    .child(key)
                    .get_tracked(cx)
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
            };
            json!(read("a") + read("b"))
        })
    }

    #[test]
    fn computes_on_creation() {
        let state = observable(json!({"a": 1, "b": 2}));
        let sum = sum_of(&state);
        assert_eq!(sum.get(), Some(json!(3)));
        assert_eq!(sum.observer().run_count(), 1);
    }

    #[test]
    fn recomputes_when_inputs_change() {
        let state = observable(json!({"a": 1, "b": 2}));
        let sum = sum_of(&state);

        state.child("a").set(10);
        assert_eq!(sum.get(), Some(json!(12)));
    }

    #[test]
    fn unchanged_results_do_not_notify() {
        let state = observable(json!({"a": 1, "b": 2}));
        let sum = sum_of(&state);
        let count = Arc::new(AtomicI32::new(0));
        let counter = count.clone();
        let _d = sum.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.assign(json!({"a": 2, "b": 1}));
        assert_eq!(sum.get(), Some(json!(3)));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        state.child("b").set(5);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn object_results_replace_the_whole_value() {
        let state = observable(json!({"items": [1, 2, 3]}));
        let source = state.clone();
        let summary = computed(move |cx| {
            let items = source.child("items").get_tracked(cx).unwrap_or(Value::Null);
            match items.as_array() {
                Some(items) if items.is_empty() => json!({"empty": true}),
                Some(items) => json!({"first": items[0], "len": items.len()}),
                None => json!({"empty": true}),
            }
        });
        assert_eq!(summary.get(), Some(json!({"first": 1, "len": 3})));

        state.child("items").set(json!([]));
        assert_eq!(summary.get(), Some(json!({"empty": true})));
    }

    #[test]
    fn disposed_computed_keeps_its_last_value() {
        let state = observable(json!({"a": 1, "b": 2}));
        let sum = sum_of(&state);
        sum.dispose();

        state.child("a").set(5);
        assert_eq!(sum.get(), Some(json!(3)));
    }
}
