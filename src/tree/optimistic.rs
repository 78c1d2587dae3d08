//! Optimistic (lock-free) traversal for [`MassTree`].
//!
//! Readers take no locks. Each node is read between `stable()` and
//! `has_changed()`:
//!
//! ```text
//! 1. v = node.version.stable()
//! 2. read permutation / keys / children / next / fence
//! 3. node.version.has_changed(v) -> re-read (same node) or restart
//! ```
//!
//! A split leaves keys that moved right reachable through `next` until the
//! parent learns about the new node, so a stale descent is repaired by
//! moving right while the slice is at or above `fence`. A deleted node is
//! never repaired locally: the operation restarts from the top layer.

use std::sync::Arc;

use crate::alloc::NodeAllocator;
use crate::internode::Internode;
use crate::key::Key;
use crate::layer::Layer;
use crate::leaf::{Leaf, SlotMatch};
use crate::node::header;
use crate::nodeversion::{NodeVersion, spin_wait};
use crate::tracing_helpers::trace_log;

use super::{MassTree, clone_value};

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Look up `key`.
    ///
    /// Returns a clone of the stored `Arc`, which stays valid after the key
    /// is replaced or removed.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Arc<V>> {
        let mut spins: u32 = 0;

        'retry: loop {
            let mut cursor: Key<'_> = Key::new(key);
            let mut layer: &Layer = &self.top;

            loop {
                let Some((leaf, version)) = self.reach_leaf(layer, cursor.ikey()) else {
                    spin_wait(&mut spins);
                    continue 'retry;
                };

                let Some(found) = Self::read_leaf(leaf, version, &cursor) else {
                    trace_log!("get: border node deleted, restarting");
                    spin_wait(&mut spins);
                    continue 'retry;
                };

                match found {
                    SlotMatch::Found { value, .. } => {
                        // SAFETY: validated under the node version; the value
                        // is live or retired, never reclaimed under us.
                        return Some(unsafe { clone_value::<V>(value) });
                    }
                    SlotMatch::Layer { layer: sub, .. } => {
                        cursor.shift();
                        // SAFETY: layers are retired before they are freed.
                        layer = unsafe { &*sub };
                    }
                    SlotMatch::Conflict { .. } | SlotMatch::NotFound { .. } => return None,
                }
            }
        }
    }

    /// Search the border node chain starting at `leaf` for the current slice
    /// of `key`. Returns `None` when a deleted node is hit.
    fn read_leaf(mut leaf: &Leaf, mut version: u32, key: &Key<'_>) -> Option<SlotMatch> {
        loop {
            if NodeVersion::value_is_deleted(version) {
                return None;
            }

            let found: SlotMatch = leaf.search(leaf.permutation(), key);
            let next: *mut Leaf = leaf.next();
            let fence: u64 = leaf.fence();

            if leaf.version().has_changed(version) {
                version = leaf.version().stable();
                continue;
            }

            if !next.is_null() && key.ikey() >= fence {
                trace_log!(fence, "get: following next link");
                // SAFETY: linked nodes are retired before they are freed.
                leaf = unsafe { &*next };
                version = leaf.version().stable();
                continue;
            }

            return Some(found);
        }
    }

    /// Descend `layer` to the border node whose range should hold `ikey`.
    ///
    /// The node may since have split; callers follow `next` from it. Returns
    /// `None` when the layer itself has been removed, in which case the
    /// caller restarts from the top layer.
    pub(super) fn reach_leaf<'a>(&'a self, layer: &'a Layer, ikey: u64) -> Option<(&'a Leaf, u32)> {
        let mut spins: u32 = 0;

        'root: loop {
            let mut node: *mut u8 = layer.root();
            // SAFETY: a root is live or retired, never freed under us.
            let mut version: u32 = unsafe { header(node) }.version().stable();

            if NodeVersion::value_is_deleted(version) {
                if layer.root() == node {
                    return None;
                }
                spin_wait(&mut spins);
                continue 'root;
            }

            loop {
                if NodeVersion::value_is_leaf(version) {
                    // SAFETY: the leaf bit never changes.
                    return Some((unsafe { &*node.cast::<Leaf>() }, version));
                }

                // SAFETY: not a leaf, so an interior node.
                let inode: &Internode = unsafe { &*node.cast::<Internode>() };
                let child: *mut u8 = inode.child(inode.child_index_for(ikey));

                if !child.is_null() {
                    // SAFETY: children are retired before they are freed.
                    let child_version: u32 = unsafe { header(child) }.version().stable();
                    if !inode.version().has_changed(version) {
                        node = child;
                        version = child_version;
                        continue;
                    }
                }

                let fresh: u32 = inode.version().stable();
                if NodeVersion::split_between(version, fresh) {
                    trace_log!("reach_leaf: interior node split, restarting layer");
                    spin_wait(&mut spins);
                    continue 'root;
                }
                version = fresh;
            }
        }
    }
}
