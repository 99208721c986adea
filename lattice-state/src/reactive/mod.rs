//! Reactive Engine
//!
//! This module implements the observable tree: handles and accessors over a
//! shared value, the diff-and-notify engine behind every write, batching,
//! and dependency tracking for observers.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] is a handle to one node of a tree wrapping a JSON value.
//! Reads resolve the node's live value; writes run the diff engine and notify
//! listeners on the written node and each of its ancestors. Every listener
//! receives a [`Change`] carrying the path from itself down to the node that
//! changed, the values before and after at that path, and a lazily
//! reconstructed copy of its own previous value.
//!
//! ## Shallow and Deep Listeners
//!
//! A listener registered with [`Observable::on_change`] hears every change at
//! its node or below. One registered with [`Observable::on_change_shallow`]
//! only hears changes to the node itself, counting keys being added or
//! removed.
//!
//! ## Batches
//!
//! Inside [`Observable::batch`] notifications are queued instead of
//! delivered, and each listener hears about the whole batch once when it
//! ends. [`Observable::assign`] and the [`ArrayNode`] mutators batch
//! internally.
//!
//! ## Observers
//!
//! [`observe`] runs a function with a [`TrackingContext`] and re-runs it
//! whenever a node it read through the context changes. [`computed`] builds a
//! derived observable on top of an observer.
//!
//! # Implementation Notes
//!
//! A write happens in two passes. The diff pass compares the new value with
//! the previous one and records a change-set, keeping element nodes of
//! id-keyed arrays attached to their elements. The dispatch pass turns the
//! change-set into notifications. Both run while the write holds the tree's
//! locks; delivery happens after the locks are released, so listeners may
//! read and write freely.

mod accessor;
mod array;
mod batch;
mod computed;
mod context;
mod diff;
mod notify;
mod observable;
mod observe;
mod on;
mod subscriber;
mod tree;

pub use accessor::{Accessor, NodeView, ObjectNode, PrimitiveNode};
pub use array::ArrayNode;
pub use batch::BatchGuard;
pub use computed::{computed, Computed};
pub use context::TrackingContext;
pub use notify::Change;
pub use observable::{observable, Observable, Read};
pub use observe::{observe, Observer};
pub use subscriber::{Disposer, Listener, ListenerId};
