//! Structural cleanup after a removal.
//!
//! ```text
//! size >= 2                      -> nothing
//! size == 0, not a layer root    -> unlink the node, drop it from its parent;
//!                                   a parent left with one child is spliced out
//! size == 0, sub-layer root      -> remove the layer and its parent slot
//! size == 1, sub-layer root leaf -> fold the entry into the parent slot
//! ```
//!
//! The last two continue with the parent border node, which may now be
//! small enough to collapse in turn.

use std::ptr::NonNull;

use crate::alloc::NodeAllocator;
use crate::alloc::reclaim::Retired;
use crate::internode::Internode;
use crate::layer::Layer;
use crate::leaf::{LAYER_KEYLENX, Leaf};
use crate::node::header;
use crate::nodeversion::LockGuard;
use crate::tracing_helpers::{debug_log, trace_log};

use super::{MassTree, StatCounters, node_ptr};

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Clean up after an entry was removed from the locked node `leaf`.
    ///
    /// `path` holds, for each enclosing layer, the layer and the slice that
    /// leads from it to the next one.
    pub(super) fn after_remove<'a>(
        &'a self,
        mut layer: &'a Layer,
        mut leaf: &'a Leaf,
        mut guard: LockGuard<'a>,
        mut path: Vec<(&'a Layer, u64)>,
    ) {
        loop {
            let size: usize = leaf.size();
            if size >= 2 {
                return;
            }

            if !leaf.parent().is_null() {
                if size == 0 {
                    self.remove_leaf(layer, leaf, guard);
                }
                return;
            }

            let Some((upper, ikey)) = path.pop() else {
                // The top layer keeps its root.
                return;
            };

            if size == 1 && leaf.keylenx(leaf.permutation().get(0)) == LAYER_KEYLENX {
                return;
            }

            let Some((border, mut border_guard, pos)) = self.lock_border(upper, ikey, layer) else {
                trace_log!(ikey, "after_remove: layer slot not found");
                return;
            };

            if size == 0 {
                self.remove_layer(layer, leaf, guard, border, &mut border_guard, pos);
            } else {
                self.collapse_layer(layer, leaf, guard, border, &mut border_guard, pos);
            }

            layer = upper;
            leaf = border;
            guard = border_guard;
        }
    }

    /// Unlink the empty, non-root node `leaf` and drop it from its parent.
    fn remove_leaf<'a>(&'a self, layer: &'a Layer, leaf: &'a Leaf, mut guard: LockGuard<'a>) {
        let Some((parent, mut parent_guard)) = self.locked_parent(leaf.header()) else {
            return;
        };
        let Some(idx) = parent.find_child(node_ptr(leaf)) else {
            unreachable!("border node missing from its locked parent");
        };

        guard.mark_deleted();
        // SAFETY: leaf locked and deleted; the parent lock orders removals of
        // its neighbours.
        unsafe { leaf.unlink(idx > 0) };

        parent_guard.mark_insert();
        parent.remove_child(idx);
        drop(guard);

        self.retire(Retired::Leaf(NonNull::from(leaf)));
        StatCounters::bump(&self.stats.leaves_removed);
        debug_log!(idx, keys = parent.nkeys(), "border node removed");

        if parent.nkeys() == 0 {
            self.collapse_internode(layer, parent, parent_guard);
        }
    }

    /// Splice out the locked interior node `node`, which has a single child.
    fn collapse_internode<'a>(&'a self, layer: &'a Layer, node: &'a Internode, mut guard: LockGuard<'a>) {
        let child: *mut u8 = node.child(0);

        match self.locked_parent(node.header()) {
            None => {
                debug_assert_eq!(layer.root(), node_ptr(node));
                layer.set_root(child);
                // SAFETY: child's parent is `node`, whose lock we hold.
                unsafe { header(child).set_parent(std::ptr::null_mut()) };
            }
            Some((grandparent, mut gp_guard)) => {
                let Some(idx) = grandparent.find_child(node_ptr(node)) else {
                    unreachable!("interior node missing from its locked parent");
                };
                gp_guard.mark_insert();
                grandparent.set_child(idx, child);
                // SAFETY: as above.
                unsafe { header(child).set_parent(std::ptr::from_ref(grandparent).cast_mut()) };
            }
        }

        guard.mark_deleted();
        drop(guard);

        self.retire(Retired::Internode(NonNull::from(node)));
        StatCounters::bump(&self.stats.internodes_collapsed);
        debug_log!("interior node collapsed");
    }
}
