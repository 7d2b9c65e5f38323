//! The latch-coupled tree map.
//!
//! [`LatchTree`] is an unbalanced binary search tree behind two layers
//! of locking:
//!
//! 1. A tree-wide [`RwLatch`]: lookups run under the shared mode, all
//!    structural mutation (insert, remove, clear) under the exclusive
//!    mode. Mutations are therefore fully serialized, and every
//!    history is explainable by a sequential BST.
//! 2. Per-node mutexes. Mutating descents couple locks hand-over-hand
//!    (the next node's lock is taken before the current one is
//!    dropped), so no traversal ever crosses an unguarded gap.
//!    Lookups, which the shared latch already protects from structural
//!    change, lock each node only while inspecting it.
//!
//! # Locking Protocol
//!
//! ```text
//! insert:  latch.write() -> root slot -> couple down -> link/overwrite
//! lookup:  latch.read()  -> root slot -> lock, inspect, unlock, step
//! remove:  latch.write() -> root slot -> couple down (parent + node)
//!          -> splice child, or swap in the in-order successor
//! clear:   latch.write() -> detach root -> post-order drain
//! ```
//!
//! Locks are only ever taken in one direction (tree latch, then root
//! slot, then parent before child, then a removal target before its
//! successor) and never re-taken after release within one operation,
//! so the wait-for graph cannot form a cycle.
//!
//! The tree is deliberately not rebalanced: adversarial insertion
//! order degenerates it into a list, and operations become linear.

use std::cmp::Ordering;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::Mutex;

use crate::latch::RwLatch;
use crate::node::{self, Branch, Node, NodeRef};
use crate::tracing_support::{debug_log, trace_log};

mod remove;

/// Whether an [`LatchTree::insert`] call added a new key or overwrote
/// an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the outcome reports whether a new key was added"]
pub enum InsertOutcome {
    /// The key was not present; a new node was linked in.
    Inserted,

    /// The key was present; its value was overwritten in place.
    Replaced,
}

impl InsertOutcome {
    /// True if the call added a new key.
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }

    /// True if the call overwrote an existing key's value.
    #[must_use]
    pub const fn is_replaced(self) -> bool {
        matches!(self, Self::Replaced)
    }
}

/// A thread-safe ordered map over an unbalanced binary search tree.
///
/// Shared between threads behind an [`std::sync::Arc`]; every method
/// takes `&self`. `LatchTree<K, V>` is `Send + Sync` when `K` and `V`
/// are `Send`.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
///
/// use latchtree::{InsertOutcome, LatchTree};
///
/// let tree = Arc::new(LatchTree::new());
///
/// let writer = {
///     let tree = Arc::clone(&tree);
///     thread::spawn(move || {
///         assert_eq!(tree.insert("d", "delta"), InsertOutcome::Inserted);
///         assert_eq!(tree.insert("d", "delta2"), InsertOutcome::Replaced);
///     })
/// };
/// writer.join().unwrap();
///
/// assert_eq!(tree.get(&"d"), Some("delta2"));
/// assert_eq!(tree.remove(&"d"), Some("delta2"));
/// assert!(tree.is_empty());
/// ```
pub struct LatchTree<K, V> {
    /// Tree-wide admission control: shared for lookups, exclusive for
    /// structural mutation.
    latch: RwLatch,

    /// The root slot. Its mutex plays the same role a parent's child
    /// slot plays for every other node.
    root: Mutex<Option<NodeRef<K, V>>>,

    /// Number of keys present. Written only by the exclusive writer.
    len: AtomicUsize,
}

impl<K, V> LatchTree<K, V> {
    /// Creates an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latch: RwLatch::new(),
            root: Mutex::new(None),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(AtomicOrdering::Relaxed)
    }

    /// True if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry, dropping the values.
    ///
    /// Equivalent to [`LatchTree::clear_with`] with a callback that
    /// does nothing.
    pub fn clear(&self) {
        let _tree = self.latch.write();
        self.drain(|_value| {});
    }

    /// Removes every entry, handing each value to `on_value` in
    /// post-order (children before their parent).
    ///
    /// Cleanup is best-effort: a panicking callback is caught and
    /// discarded, the drain continues, and the latch is released
    /// normally. A caller that needs to observe failures should use
    /// [`LatchTree::try_clear_with`] or instrument the callback.
    pub fn clear_with<F>(&self, mut on_value: F)
    where
        F: FnMut(V),
    {
        let _tree = self.latch.write();
        self.drain(|value| {
            let _ = catch_unwind(AssertUnwindSafe(|| on_value(value)));
        });
    }

    /// Removes every entry like [`LatchTree::clear_with`], collecting
    /// callback failures instead of discarding them.
    ///
    /// The drain always runs to completion; the returned list holds
    /// one error per failed callback invocation, in visit order.
    pub fn try_clear_with<E, F>(&self, mut on_value: F) -> Vec<E>
    where
        F: FnMut(V) -> Result<(), E>,
    {
        let _tree = self.latch.write();
        let mut failures = Vec::new();
        self.drain(|value| {
            if let Err(err) = on_value(value) {
                failures.push(err);
            }
        });
        failures
    }

    /// Detaches the root and tears the tree down, feeding every value
    /// to `visit` in post-order.
    ///
    /// Caller must hold the exclusive latch. No per-node locking is
    /// needed: with the writer latch held and the structure detached,
    /// each node handle is the sole owner of its subtree.
    fn drain(&self, visit: impl FnMut(V)) {
        let detached = self.root.lock().take();
        self.len.store(0, AtomicOrdering::Relaxed);
        if let Some(root) = detached {
            debug_log!("clear: draining detached tree");
            drain_postorder(root, visit);
        }
    }
}

impl<K: Ord, V> LatchTree<K, V> {
    /// Inserts `value` under `key`, overwriting in place if the key is
    /// already present.
    ///
    /// Runs under the exclusive latch. The descent couples node locks
    /// hand-over-hand: the chosen child is locked before the current
    /// node's lock is dropped, and only the current node's lock is
    /// held in the steady state.
    pub fn insert(&self, key: K, value: V) -> InsertOutcome {
        let _tree = self.latch.write();

        let mut root = self.root.lock();
        let Some(top) = root.as_ref() else {
            *root = Some(Node::link(key, value));
            self.len.fetch_add(1, AtomicOrdering::Relaxed);
            trace_log!("insert: created root");
            return InsertOutcome::Inserted;
        };

        let mut cur = top.lock_arc();
        drop(root);

        loop {
            let branch = match key.cmp(&cur.key) {
                Ordering::Equal => {
                    cur.value = value;
                    trace_log!("insert: overwrote value in place");
                    return InsertOutcome::Replaced;
                }
                Ordering::Less => Branch::Left,
                Ordering::Greater => Branch::Right,
            };

            match branch.of(&cur).clone() {
                Some(next) => {
                    // Hand-over-hand: the assignment locks the child
                    // first, then drops the previous guard.
                    cur = next.lock_arc();
                }
                None => {
                    *branch.of_mut(&mut cur) = Some(Node::link(key, value));
                    self.len.fetch_add(1, AtomicOrdering::Relaxed);
                    trace_log!("insert: linked new node");
                    return InsertOutcome::Inserted;
                }
            }
        }
    }

    /// Returns a copy of the value stored under `key`, if any.
    ///
    /// Runs under the shared latch, so any number of lookups proceed
    /// in parallel while mutators are held off. Each node is locked
    /// only while it is being inspected; the lock is dropped before
    /// the next node is visited.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let _tree = self.latch.read();

        let mut cur = self.root.lock().clone();
        while let Some(link) = cur {
            let locked = link.lock();
            cur = match key.cmp(&locked.key) {
                Ordering::Equal => return Some(locked.value.clone()),
                Ordering::Less => locked.left.clone(),
                Ordering::Greater => locked.right.clone(),
            };
        }
        None
    }

    /// True if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        let _tree = self.latch.read();

        let mut cur = self.root.lock().clone();
        while let Some(link) = cur {
            let locked = link.lock();
            cur = match key.cmp(&locked.key) {
                Ordering::Equal => return true,
                Ordering::Less => locked.left.clone(),
                Ordering::Greater => locked.right.clone(),
            };
        }
        false
    }
}

impl<K, V> Default for LatchTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for LatchTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatchTree")
            .field("len", &self.len())
            .field("latch", &self.latch)
            .finish_non_exhaustive()
    }
}

impl<K, V> Drop for LatchTree<K, V> {
    fn drop(&mut self) {
        // `&mut self` means no other handle exists, so the latch is
        // not needed. The drain is still required: letting the root
        // handle drop on its own would recurse through the child
        // chain, and a degenerate tree is as deep as it is long.
        if let Some(root) = self.root.lock().take() {
            drain_postorder(root, |_value| {});
        }
    }
}

/// Steps of the iterative post-order teardown.
enum Teardown<K, V> {
    /// Unwrap this subtree root and schedule its pieces.
    Expand(NodeRef<K, V>),

    /// Both subtrees are done; hand the value to the visitor.
    Emit(V),
}

/// Consumes a detached subtree bottom-up, feeding each value to
/// `visit` in post-order. Children are detached from every node before
/// it is dropped, keeping the stack depth explicit.
fn drain_postorder<K, V>(root: NodeRef<K, V>, mut visit: impl FnMut(V)) {
    let mut stack = vec![Teardown::Expand(root)];
    while let Some(step) = stack.pop() {
        match step {
            Teardown::Expand(link) => {
                let cell = node::unwrap_unlinked(link);
                stack.push(Teardown::Emit(cell.value));
                if let Some(right) = cell.right {
                    stack.push(Teardown::Expand(right));
                }
                if let Some(left) = cell.left {
                    stack.push(Teardown::Expand(left));
                }
            }
            Teardown::Emit(value) => visit(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> LatchTree<&'static str, &'static str> {
        let tree = LatchTree::new();
        for (key, value) in [
            ("d", "delta"),
            ("b", "bravo"),
            ("a", "alpha"),
            ("c", "charlie"),
            ("e", "echo"),
        ] {
            assert_eq!(tree.insert(key, value), InsertOutcome::Inserted);
        }
        tree
    }

    /// In-order key walk over the private structure; also checks the
    /// search-tree ordering along the way.
    fn keys_in_order<K: Ord + Clone, V>(tree: &LatchTree<K, V>) -> Vec<K> {
        fn walk<K: Ord + Clone, V>(link: &Option<NodeRef<K, V>>, out: &mut Vec<K>) {
            if let Some(node) = link {
                let locked = node.lock();
                walk(&locked.left, out);
                out.push(locked.key.clone());
                walk(&locked.right, out);
            }
        }

        let root = tree.root.lock().clone();
        let mut out = Vec::new();
        walk(&root, &mut out);
        assert!(
            out.windows(2).all(|pair| pair[0] < pair[1]),
            "in-order walk must be strictly increasing"
        );
        out
    }

    fn root_key<K: Clone, V>(tree: &LatchTree<K, V>) -> Option<K> {
        let root = tree.root.lock().clone();
        root.map(|node| node.lock().key.clone())
    }

    #[test]
    fn tree_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LatchTree<String, Vec<u8>>>();
    }

    #[test]
    fn empty_tree_has_nothing() {
        let tree: LatchTree<&str, u32> = LatchTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.get(&"missing"), None);
        assert!(!tree.contains_key(&"missing"));
        assert_eq!(tree.remove(&"missing"), None);
    }

    #[test]
    fn insert_then_lookup() {
        let tree = sample_tree();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.get(&"c"), Some("charlie"));
        assert!(tree.contains_key(&"a"));
        assert_eq!(tree.get(&"z"), None);
        assert_eq!(keys_in_order(&tree), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn insert_existing_key_replaces_in_place() {
        let tree = sample_tree();
        assert_eq!(tree.insert("d", "delta2"), InsertOutcome::Replaced);
        assert_eq!(tree.get(&"d"), Some("delta2"));
        assert_eq!(tree.len(), 5);
        assert_eq!(keys_in_order(&tree), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn remove_inner_node_keeps_order() {
        let tree = sample_tree();
        assert_eq!(tree.remove(&"b"), Some("bravo"));
        assert_eq!(tree.get(&"b"), None);
        assert_eq!(tree.len(), 4);
        assert_eq!(keys_in_order(&tree), vec!["a", "c", "d", "e"]);
    }

    #[test]
    fn remove_root_promotes_in_order_successor() {
        let tree = sample_tree();
        assert_eq!(root_key(&tree), Some("d"));

        // Root has both subtrees; its successor "e" must take its place.
        assert_eq!(tree.remove(&"d"), Some("delta"));
        assert_eq!(root_key(&tree), Some("e"));
        assert_eq!(keys_in_order(&tree), vec!["a", "b", "c", "e"]);
    }

    #[test]
    fn insert_outcome_helpers() {
        assert!(InsertOutcome::Inserted.is_inserted());
        assert!(!InsertOutcome::Inserted.is_replaced());
        assert!(InsertOutcome::Replaced.is_replaced());
    }

    #[test]
    fn len_tracks_mutations() {
        let tree = LatchTree::new();
        assert_eq!(tree.len(), 0);
        let _ = tree.insert(2, 'b');
        let _ = tree.insert(1, 'a');
        let _ = tree.insert(2, 'B');
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.remove(&2), Some('B'));
        assert_eq!(tree.len(), 1);
        tree.clear();
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn clear_visits_values_in_post_order() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.clear_with(|value| seen.push(value));

        // Shape is fixed by insertion order: d at the root, b and e
        // below it, a and c below b.
        assert_eq!(seen, vec!["alpha", "charlie", "bravo", "echo", "delta"]);
        assert!(tree.is_empty());
        assert_eq!(tree.get(&"c"), None);
    }

    #[test]
    fn clear_swallows_callback_panics() {
        let tree = sample_tree();
        let mut survived = Vec::new();
        tree.clear_with(|value| {
            assert!(value != "charlie", "charlie is unacceptable");
            survived.push(value);
        });

        assert_eq!(survived, vec!["alpha", "bravo", "echo", "delta"]);
        assert!(tree.is_empty());

        // The latch must still be usable after the panicking drain.
        let _ = tree.insert("x", "xray");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn try_clear_with_collects_failures() {
        let tree = sample_tree();
        let failures = tree.try_clear_with(|value| {
            if value.starts_with('c') || value.starts_with('e') {
                Err(value)
            } else {
                Ok(())
            }
        });

        assert_eq!(failures, vec!["charlie", "echo"]);
        assert!(tree.is_empty());
    }

    #[test]
    fn clear_on_empty_tree_is_a_no_op() {
        let tree: LatchTree<u32, u32> = LatchTree::new();
        let mut calls = 0;
        tree.clear_with(|_| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    fn degenerate_chain_still_works() {
        // Ascending keys give the worst shape: a right-leaning list.
        let tree = LatchTree::new();
        for i in 0..10_000u32 {
            let _ = tree.insert(i, i);
        }
        assert_eq!(tree.len(), 10_000);
        assert_eq!(tree.get(&9_999), Some(9_999));
        assert_eq!(tree.remove(&5_000), Some(5_000));
        assert_eq!(tree.get(&5_000), None);
        assert_eq!(tree.len(), 9_999);
        // Dropping the tree must not recurse through 10k nodes.
        drop(tree);
    }

    #[test]
    fn debug_output_mentions_len() {
        let tree = sample_tree();
        let rendered = format!("{tree:?}");
        assert!(rendered.contains("len: 5"));
    }
}
