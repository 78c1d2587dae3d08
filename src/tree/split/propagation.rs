//! Split propagation.
//!
//! After a node splits into `left | split | right`, the parent gains the
//! separator and the new child. A full parent splits in turn and the
//! middle key moves up; a split root gets a new root above it.
//!
//! Every lock taken on the way up is held until the whole chain is done, so
//! a new node is never visible with a stale parent pointer.

use std::ptr::NonNull;

use crate::alloc::{NodeAllocator, alloc_node};
use crate::internode::Internode;
use crate::layer::Layer;
use crate::node::header;
use crate::nodeversion::{LockGuard, spin_wait};
use crate::tracing_helpers::{debug_log, warn_log};

use super::super::{MassTree, StatCounters, node_ptr};

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Hook `right` into the tree next to `left`, separated by `split`.
    ///
    /// The caller holds the locks of `left` and `right`.
    pub(in crate::tree) fn propagate_split<'a>(
        &'a self,
        layer: &'a Layer,
        mut left: *mut u8,
        mut right: *mut u8,
        mut split: u64,
        reserve: &mut Vec<NonNull<Internode>>,
    ) {
        let mut held: Vec<LockGuard<'a>> = Vec::new();

        loop {
            // SAFETY: left is locked by us, so it is live.
            let Some((parent, mut parent_guard)) = self.locked_parent(unsafe { header(left) }) else {
                let root: NonNull<Internode> = self.take_internode(reserve);
                // SAFETY: fresh node; published by set_root below.
                unsafe {
                    root.as_ref().init_root(left, split, right);
                    header(left).set_parent(root.as_ptr());
                    header(right).set_parent(root.as_ptr());
                }
                layer.set_root(root.as_ptr().cast::<u8>());

                debug_log!(split, "new layer root");
                break;
            };

            let Some(idx) = parent.find_child(left) else {
                unreachable!("split node missing from its locked parent");
            };

            if !parent.is_full() {
                parent_guard.mark_insert();
                // SAFETY: right is locked by us and has no parent yet.
                unsafe { header(right).set_parent(std::ptr::from_ref(parent).cast_mut()) };
                parent.insert_after(idx, split, right);
                held.push(parent_guard);
                break;
            }

            let sibling: NonNull<Internode> = self.take_internode(reserve);
            // SAFETY: fresh node; it lives until retired like any node.
            let sib: &'a Internode = unsafe { sibling.as_ref() };
            let sib_guard: LockGuard<'a> = sib.version().lock();
            parent_guard.mark_split();

            let median: u64 = parent.split_insert(sib, idx, split, right);
            StatCounters::bump(&self.stats.internode_splits);
            debug_log!(median, "interior split");

            held.push(parent_guard);
            held.push(sib_guard);
            left = node_ptr(parent);
            right = sibling.as_ptr().cast::<u8>();
            split = median;
        }

        drop(held);
    }

    /// Take an interior node from the reserve, or allocate one, waiting for
    /// memory if necessary. Locks are held, so failing is not an option.
    fn take_internode(&self, reserve: &mut Vec<NonNull<Internode>>) -> NonNull<Internode> {
        if let Some(node) = reserve.pop() {
            return node;
        }

        let mut spins: u32 = 0;
        loop {
            match alloc_node(&self.allocator, Internode::new()) {
                Ok(node) => return node,
                Err(_) => {
                    warn_log!("split reserve exhausted; waiting for memory");
                    spin_wait(&mut spins);
                }
            }
        }
    }
}
