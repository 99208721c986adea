//! One-shot listeners: run a callback the first time a node's value
//! satisfies a condition, then unsubscribe.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::Value;

use super::notify::Change;
use super::subscriber::Disposer;
use super::Observable;

/// Run `callback` once `predicate` holds for the node's value.
///
/// If it already holds, the callback runs immediately and the returned
/// disposer is inert.
pub(crate) fn once_when<P, F>(node: &Observable, predicate: P, callback: F) -> Disposer
where
    P: Fn(&Value) -> bool + Send + Sync + 'static,
    F: FnOnce(Value) + Send + 'static,
{
    if let Some(current) = node.get().filter(|value| predicate(value)) {
        callback(current);
        return Disposer::inert();
    }

    let pending = Mutex::new(Some(callback));
    let registration: Arc<OnceLock<Disposer>> = Arc::new(OnceLock::new());
    let own = Arc::clone(&registration);

    let disposer = node.listen(
        false,
        Arc::new(move |change: &Change| {
            let Some(value) = change.value().filter(|value| predicate(value)) else {
                return;
            };
            let Some(callback) = pending.lock().take() else {
                return;
            };
            if let Some(disposer) = own.get() {
                disposer.dispose();
            }
            callback(value.clone());
        }),
    );
    let _ = registration.set(disposer.clone());
    disposer
}

#[cfg(test)]
mod tests {
    use crate::reactive::observable;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_immediately_when_already_satisfied() {
        let state = observable(json!({"ready": true}));
        let count = Arc::new(AtomicI32::new(0));
        let counter = count.clone();

        let disposer = state.child("ready").on_true(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!disposer.dispose());
        assert_eq!(state.child("ready").listener_count(), 0);
    }

    #[test]
    fn fires_once_then_unsubscribes() {
        let state = observable(json!({"n": 0}));
        let count = Arc::new(AtomicI32::new(0));
        let counter = count.clone();

        state.child("n").on_equals(2, move |value| {
            assert_eq!(value, json!(2));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.child("n").set(1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        state.child("n").set(2);
        state.child("n").set(3);
        state.child("n").set(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(state.child("n").listener_count(), 0);
    }

    #[test]
    fn has_value_ignores_null() {
        let state = observable(json!({"user": null}));
        let count = Arc::new(AtomicI32::new(0));
        let counter = count.clone();

        state.child("user").on_has_value(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        state.child("user").set(json!({"name": "a"}));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
