//! Node Graph
//!
//! This module implements the lazily-materialized node tree that mirrors the
//! shape of an observed value.
//!
//! # Overview
//!
//! Each observable tree owns a [`NodeArena`]. A node stands for one path in
//! the tree (`items.2.name`), not for the value currently found there:
//!
//! - Nodes are created on first access and memoized per `(parent, key)`, so
//!   every access to the same path returns the same [`NodeId`].
//! - A node's value is resolved on demand by walking parent links to the
//!   root and re-indexing the raw value. Nodes cannot go stale relative to
//!   the data they describe.
//! - Listeners hang off nodes, which is why node identity has to survive
//!   writes. Array reorders move nodes between slots rather than replacing
//!   them.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an arena with generation-tagged ids rather than behind
//!    reference-counted parent pointers, so parent and child links cannot
//!    form cycles.
//!
//! 2. Children are stored in insertion order, matching the iteration order
//!    of the raw objects they mirror.

mod arena;
mod key;
mod node;

pub use arena::NodeArena;
pub use key::{display_path, Key, Path};
pub use node::{Node, NodeId};
