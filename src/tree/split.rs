//! Border node split for [`MassTree`].
//!
//! ```text
//! 1. reserve: one border node, plus one interior node per full ancestor,
//!    plus one more if that chain reaches the root
//! 2. lock the fresh sibling, mark the full node splitting
//! 3. move the upper half (and the new entry) into the sibling
//! 4. link the sibling after the node (fence = split slice)
//! 5. insert the split slice into the parent, splitting upwards as needed
//! 6. unlock everything
//! ```
//!
//! Allocation happens before anything is touched, so an allocation failure
//! leaves the tree as it was. If concurrent splits above use up the reserve
//! mid-flight, propagation allocates again and waits for memory.

use std::ptr::NonNull;

use crate::alloc::{NodeAllocator, alloc_node, free_node};
use crate::error::AllocError;
use crate::internode::Internode;
use crate::layer::Layer;
use crate::leaf::{Entry, Leaf};
use crate::nodeversion::LockGuard;
use crate::tracing_helpers::debug_log;

use super::{MassTree, StatCounters, node_ptr};

mod parent_locking;
mod propagation;

/// Nodes set aside for one split.
pub(super) struct SplitReserve {
    leaf: NonNull<Leaf>,
    internodes: Vec<NonNull<Internode>>,
}

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Allocate every node a split of `leaf` is expected to need.
    ///
    /// The caller holds `leaf`'s lock, so its parent is fixed; the full
    /// ancestors above it are counted without locks and may change.
    pub(super) fn reserve_split(&self, leaf: &Leaf) -> Result<SplitReserve, AllocError> {
        let mut needed: usize = 0;
        let mut parent: *mut Internode = leaf.parent();
        loop {
            if parent.is_null() {
                needed += 1;
                break;
            }
            // SAFETY: ancestors are live or retired, never freed under us.
            let inode: &Internode = unsafe { &*parent };
            if !inode.is_full() {
                break;
            }
            needed += 1;
            parent = inode.header().parent();
        }

        let leaf: NonNull<Leaf> = alloc_node(&self.allocator, Leaf::new())?;
        let mut internodes: Vec<NonNull<Internode>> = Vec::with_capacity(needed);
        for _ in 0..needed {
            match alloc_node(&self.allocator, Internode::new()) {
                Ok(node) => internodes.push(node),
                Err(e) => {
                    // SAFETY: none of these were published.
                    unsafe {
                        free_node(&self.allocator, leaf);
                        for node in internodes {
                            free_node(&self.allocator, node);
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(SplitReserve { leaf, internodes })
    }

    /// Split the full node `leaf` while inserting `entry` at logical
    /// position `pos`.
    pub(super) fn split_insert<'a>(
        &'a self,
        layer: &'a Layer,
        leaf: &'a Leaf,
        mut guard: LockGuard<'a>,
        pos: usize,
        entry: Entry,
        reserve: SplitReserve,
    ) {
        let SplitReserve {
            leaf: right_ptr,
            mut internodes,
        } = reserve;

        // SAFETY: fresh allocation; it lives until retired like any node.
        let right: &'a Leaf = unsafe { right_ptr.as_ref() };
        let right_guard: LockGuard<'a> = right.version().lock();
        guard.mark_split();

        let split: u64 = leaf.split_into(right, pos, entry);
        // SAFETY: both locked, leaf marked splitting, right is fresh.
        unsafe { leaf.link_split(right_ptr.as_ptr(), split) };

        StatCounters::bump(&self.stats.leaf_splits);
        debug_log!(split, left = leaf.size(), right = right.size(), "border split");

        self.propagate_split(layer, node_ptr(leaf), node_ptr(right), split, &mut internodes);

        drop(right_guard);
        drop(guard);

        for node in internodes {
            // SAFETY: left over from the reserve, never published.
            unsafe { free_node(&self.allocator, node) };
        }
    }
}
