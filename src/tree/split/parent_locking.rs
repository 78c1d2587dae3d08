//! Parent locking.
//!
//! A node's parent pointer only changes under the lock of its current
//! parent (or the node's own lock while it is a root), so locking the
//! parent we read and re-reading the pointer is enough to pin it.

use crate::alloc::NodeAllocator;
use crate::internode::Internode;
use crate::node::NodeHeader;
use crate::nodeversion::{LockGuard, NodeVersion, spin_wait};

use super::super::MassTree;

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Lock the parent of `node`.
    ///
    /// Returns `None` when `node` is the root of its layer. The caller holds
    /// `node`'s lock, which keeps that answer stable.
    pub(in crate::tree) fn locked_parent<'a>(
        &'a self,
        node: &NodeHeader,
    ) -> Option<(&'a Internode, LockGuard<'a>)> {
        let mut spins: u32 = 0;

        loop {
            let parent: *mut Internode = node.parent();
            if parent.is_null() {
                return None;
            }

            // SAFETY: a parent is live or retired, never freed under us.
            let inode: &'a Internode = unsafe { &*parent };
            let guard: LockGuard<'a> = inode.version().lock();
            if node.parent() == parent {
                debug_assert!(!NodeVersion::value_is_deleted(guard.locked_value()));
                return Some((inode, guard));
            }

            drop(guard);
            spin_wait(&mut spins);
        }
    }
}
