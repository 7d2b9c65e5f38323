//! Removal, including the two-child successor splice.
//!
//! The descent couples locks like insert does, but additionally keeps
//! the matched node's parent locked, because a node with at most one
//! child is spliced out of the parent's slot. A node with two children
//! is not unlinked at all: its payload is replaced by its in-order
//! successor's, and the successor (which has no left child by
//! definition) is unlinked instead.
//!
//! Lock ownership is an owned guard, so every release is a move. The
//! classic hazard of this splice - releasing the target's lock twice
//! when the successor turns out to be its direct right child - cannot
//! be expressed here: in that case no separate successor-parent guard
//! exists in the first place (see [`SuccessorSlot`]).

use std::cmp::Ordering;
use std::mem;
use std::sync::atomic::Ordering as AtomicOrdering;

use crate::node::{self, Branch, OwnedNodeGuard};
use crate::tracing_support::trace_log;

use super::LatchTree;

/// Where the successor hangs once the dedicated descent is done.
enum SuccessorSlot<K, V> {
    /// The successor is the target's own right child; the target is
    /// its parent and no second guard exists.
    RightOfTarget,

    /// The successor is the left child of this separately-locked
    /// parent node.
    LeftOf(OwnedNodeGuard<K, V>),
}

impl<K: Ord, V> LatchTree<K, V> {
    /// Removes `key`, returning the value it held.
    ///
    /// Runs under the exclusive latch. At most two node locks are held
    /// during the search (parent and current, with the brief overlap
    /// of hand-over-hand coupling); the two-child case briefly holds a
    /// third, the successor's, while it is spliced out.
    pub fn remove(&self, key: &K) -> Option<V> {
        let _tree = self.latch.write();

        let mut root = self.root.lock();
        let mut cur = match root.as_ref() {
            Some(top) => top.lock_arc(),
            None => return None,
        };
        let mut parent: Option<(OwnedNodeGuard<K, V>, Branch)> = None;

        loop {
            let branch = match key.cmp(&cur.key) {
                Ordering::Equal => break,
                Ordering::Less => Branch::Left,
                Ordering::Greater => Branch::Right,
            };

            let Some(next) = branch.of(&cur).clone() else {
                trace_log!("remove: key not present");
                return None;
            };

            // Couple downward: lock the child, then let the old parent
            // guard go. The previous node stays locked as the new
            // parent.
            let next = next.lock_arc();
            parent = Some((mem::replace(&mut cur, next), branch));
        }

        let value = if cur.left.is_some() && cur.right.is_some() {
            // The splice happens below the target; neither the search
            // parent nor the root slot is involved.
            drop(parent);
            drop(root);
            trace_log!("remove: replacing payload with in-order successor");
            splice_successor(&mut cur)
        } else {
            let replacement = cur.left.take().or_else(|| cur.right.take());
            let slot = match &mut parent {
                Some((search_parent, branch)) => branch.of_mut(search_parent),
                None => &mut *root,
            };
            let Some(unlinked) = mem::replace(slot, replacement) else {
                unreachable!("parent slot no longer points at the matched node")
            };
            drop(cur);
            trace_log!("remove: spliced node with at most one child");
            node::unwrap_unlinked(unlinked).value
        };

        self.len.fetch_sub(1, AtomicOrdering::Relaxed);
        Some(value)
    }
}

/// Replaces the payload of `target` (locked, two children) with its
/// in-order successor's, unlinks the successor, and returns the
/// target's previous value.
///
/// The descent starts from the target's right child and follows left
/// links with lock coupling; the target's own guard is never released,
/// so the caller still holds a consistent node when this returns.
fn splice_successor<K, V>(target: &mut OwnedNodeGuard<K, V>) -> V {
    let mut succ = match &target.right {
        Some(right) => right.lock_arc(),
        None => unreachable!("two-child removal requires a right subtree"),
    };

    let mut hangs = SuccessorSlot::RightOfTarget;
    loop {
        let Some(next) = succ.left.clone() else { break };
        let next = next.lock_arc();
        hangs = SuccessorSlot::LeftOf(mem::replace(&mut succ, next));
    }

    // The successor carries the smallest key of the right subtree, so
    // it can take the target's place in key order. Swapping (rather
    // than overwriting) leaves the target's old payload in the node
    // about to be unlinked.
    mem::swap(&mut target.key, &mut succ.key);
    mem::swap(&mut target.value, &mut succ.value);

    let orphan = succ.right.take();
    let slot = match hangs {
        SuccessorSlot::RightOfTarget => &mut target.right,
        SuccessorSlot::LeftOf(ref mut succ_parent) => &mut succ_parent.left,
    };
    let Some(unlinked) = mem::replace(slot, orphan) else {
        unreachable!("successor slot no longer points at the successor")
    };

    drop(succ);
    node::unwrap_unlinked(unlinked).value
}

#[cfg(test)]
mod tests {
    use crate::tree::InsertOutcome;
    use crate::LatchTree;

    fn tree_of(keys: &[u32]) -> LatchTree<u32, u32> {
        let tree = LatchTree::new();
        for &key in keys {
            assert_eq!(tree.insert(key, key * 10), InsertOutcome::Inserted);
        }
        tree
    }

    #[test]
    fn remove_from_empty_tree() {
        let tree: LatchTree<u32, u32> = LatchTree::new();
        assert_eq!(tree.remove(&7), None);
    }

    #[test]
    fn remove_leaf() {
        let tree = tree_of(&[50, 30, 70]);
        assert_eq!(tree.remove(&30), Some(300));
        assert_eq!(tree.get(&30), None);
        assert_eq!(tree.get(&50), Some(500));
        assert_eq!(tree.get(&70), Some(700));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn remove_sole_root() {
        let tree = tree_of(&[42]);
        assert_eq!(tree.remove(&42), Some(420));
        assert!(tree.is_empty());
        assert_eq!(tree.get(&42), None);
    }

    #[test]
    fn remove_node_with_left_child_only() {
        let tree = tree_of(&[50, 30, 20]);
        assert_eq!(tree.remove(&30), Some(300));
        // 20 must be promoted into 30's place under 50.
        assert_eq!(tree.get(&20), Some(200));
        assert_eq!(tree.get(&50), Some(500));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn remove_node_with_right_child_only() {
        let tree = tree_of(&[50, 30, 40]);
        assert_eq!(tree.remove(&30), Some(300));
        assert_eq!(tree.get(&40), Some(400));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn remove_root_with_single_child() {
        let tree = tree_of(&[50, 70]);
        assert_eq!(tree.remove(&50), Some(500));
        assert_eq!(tree.get(&70), Some(700));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn two_child_removal_with_adjacent_successor() {
        // 70 is 50's right child and has no left subtree, so the
        // successor's parent is the removed node itself.
        let tree = tree_of(&[50, 30, 70, 80]);
        assert_eq!(tree.remove(&50), Some(500));
        for (key, value) in [(30, 300), (70, 700), (80, 800)] {
            assert_eq!(tree.get(&key), Some(value));
        }
        assert_eq!(tree.get(&50), None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn two_child_removal_with_deep_successor() {
        // The successor of 50 is 55, two left steps into the right
        // subtree, and it has a right child (58) that must be
        // reattached to the successor's parent.
        let tree = tree_of(&[50, 30, 80, 60, 90, 55, 58]);
        assert_eq!(tree.remove(&50), Some(500));
        assert_eq!(tree.get(&50), None);
        for key in [30, 55, 58, 60, 80, 90] {
            assert_eq!(tree.get(&key), Some(key * 10), "key {key} lost");
        }
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn remove_misses_between_existing_keys() {
        let tree = tree_of(&[50, 30, 70]);
        assert_eq!(tree.remove(&60), None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn remove_every_key_in_mixed_order() {
        let keys = [50, 30, 70, 20, 40, 60, 80, 35, 45, 75];
        let tree = tree_of(&keys);

        for (i, key) in [40, 50, 20, 80, 30, 75, 35, 70, 60, 45].iter().enumerate() {
            assert_eq!(tree.remove(key), Some(key * 10));
            assert_eq!(tree.remove(key), None, "double removal must miss");
            assert_eq!(tree.len(), keys.len() - i - 1);
        }
        assert!(tree.is_empty());
    }
}
