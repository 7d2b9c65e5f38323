//! # `latchtree`
//!
//! A thread-safe, ordered, in-memory key-value store backed by an
//! unbalanced binary search tree.
//!
//! The interesting part is the concurrency control, which works in two
//! layers:
//! - A **writer-preferring reader-writer latch** over the whole tree:
//!   any number of lookups share it, every structural mutation holds
//!   it exclusively, and a waiting writer blocks newly-arriving
//!   readers so a reader stream cannot starve it.
//! - **Per-node locks**, coupled hand-over-hand during mutating
//!   descents: the next node's lock is taken before the current one is
//!   released, so a traversal never crosses an unguarded gap. The
//!   two-child removal case briefly holds a third lock while the
//!   in-order successor is spliced out.
//!
//! | Operation | Tree latch | Node locks |
//! |-----------|-----------|------------|
//! | `get` / `contains_key` | shared | one at a time, per inspection |
//! | `insert` | exclusive | hand-over-hand coupling |
//! | `remove` | exclusive | coupling, parent + node (+ successor) |
//! | `clear` / `clear_with` | exclusive | none (tree is detached) |
//!
//! The tree is **not** balanced: sorted insertion order degenerates it
//! into a list and operations become linear. That trade-off is
//! accepted; this crate is about the locking protocol, not about
//! rotations.
//!
//! ## Example
//!
//! ```rust
//! use latchtree::{InsertOutcome, LatchTree};
//!
//! let tree = LatchTree::new();
//! assert_eq!(tree.insert("d", "delta"), InsertOutcome::Inserted);
//! assert_eq!(tree.insert("d", "delta2"), InsertOutcome::Replaced);
//! assert_eq!(tree.get(&"d"), Some("delta2"));
//! assert_eq!(tree.remove(&"d"), Some("delta2"));
//! assert!(tree.is_empty());
//! ```
//!
//! ## Thread Safety
//!
//! `LatchTree<K, V>` is `Send + Sync` when `K` and `V` are `Send`;
//! share it behind an [`std::sync::Arc`]. All mutating operations are
//! serialized against each other and against lookups, so any
//! concurrent history is linearizable against a sequential BST.
//!
//! Absence is never an error: `get` and `remove` return `None` for a
//! missing key. The only caller-supplied code the tree runs is the
//! `clear` callback; see [`LatchTree::clear_with`] for the best-effort
//! policy and [`LatchTree::try_clear_with`] for surfaced failures.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod latch;
mod node;
mod tracing_support;
pub mod tree;

pub use latch::RwLatch;
pub use tree::{InsertOutcome, LatchTree};
