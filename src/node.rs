//! Tree cells and child-link plumbing.
//!
//! A node's per-node lock is the [`Mutex`] wrapping it; the lock is
//! created with the node and never replaced. Child links are
//! [`Arc`]-owned, so a traversal can hold a node's lock as an *owned*
//! guard ([`OwnedNodeGuard`], via `parking_lot`'s `arc_lock` feature).
//! Releasing a lock is then a move: hand-over-hand release ordering
//! falls out of drop order, and releasing the same lock twice is
//! impossible by construction.

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;

/// Owning handle to a node. Exactly one of these lives in the tree
/// structure per node (in a parent's child slot or the root slot);
/// additional clones exist only transiently inside traversals.
pub(crate) type NodeRef<K, V> = Arc<Mutex<Node<K, V>>>;

/// A node lock held as an owned value rather than a borrow, so it can
/// outlive the local variable the node was reached through.
pub(crate) type OwnedNodeGuard<K, V> = ArcMutexGuard<RawMutex, Node<K, V>>;

/// One cell of the tree.
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Option<NodeRef<K, V>>,
    pub(crate) right: Option<NodeRef<K, V>>,
}

impl<K, V> Node<K, V> {
    /// Creates a leaf node wrapped in its lock, ready to be linked
    /// into a child slot.
    pub(crate) fn link(key: K, value: V) -> NodeRef<K, V> {
        Arc::new(Mutex::new(Self {
            key,
            value,
            left: None,
            right: None,
        }))
    }
}

/// Which child slot of a node a descent stepped through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Branch {
    Left,
    Right,
}

impl Branch {
    pub(crate) fn of<K, V>(self, node: &Node<K, V>) -> &Option<NodeRef<K, V>> {
        match self {
            Self::Left => &node.left,
            Self::Right => &node.right,
        }
    }

    pub(crate) fn of_mut<K, V>(self, node: &mut Node<K, V>) -> &mut Option<NodeRef<K, V>> {
        match self {
            Self::Left => &mut node.left,
            Self::Right => &mut node.right,
        }
    }
}

/// Takes ownership of a node that has been unlinked from the tree.
///
/// Callable only once the structure no longer points at the node and
/// every guard on it has been dropped; the handle passed in is then
/// the sole owner. A failure here is a bug in the unlink protocol, not
/// a runtime condition.
pub(crate) fn unwrap_unlinked<K, V>(node: NodeRef<K, V>) -> Node<K, V> {
    match Arc::try_unwrap(node) {
        Ok(cell) => cell.into_inner(),
        Err(_) => unreachable!("unlinked node still has live handles"),
    }
}
