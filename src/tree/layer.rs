//! Sub-layer lifecycle for [`MassTree`].
//!
//! A layer opens when a second key arrives whose slice matches an existing
//! suffix slot. It closes again on removal:
//!
//! - empty root border node: the parent slot is removed
//! - single entry in the root border node: the entry moves back up into the
//!   parent slot as a suffix slot
//!
//! The sub-layer is locked before the border node that points to it.

use std::ptr::NonNull;

use crate::alloc::reclaim::Retired;
use crate::alloc::{NodeAllocator, alloc_node, free_node};
use crate::error::AllocError;
use crate::key::{IKEY_SIZE, Key, extend_with_ikey};
use crate::layer::Layer;
use crate::leaf::{Entry, KSUF_KEYLENX, LAYER_KEYLENX, Leaf};
use crate::nodeversion::LockGuard;
use crate::suffix::KeySuffix;
use crate::tracing_helpers::debug_log;

use super::{MassTree, StatCounters, node_ptr};

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Replace the suffix slot `slot` of the locked node `leaf` with a new
    /// sub-layer holding that slot's entry one slice deeper.
    ///
    /// Returns the new layer; the caller continues its insert there.
    pub(super) fn make_new_layer<'a>(
        &'a self,
        leaf: &'a Leaf,
        guard: &mut LockGuard<'a>,
        slot: usize,
    ) -> Result<&'a Layer, AllocError> {
        let root: NonNull<Leaf> = alloc_node(&self.allocator, Leaf::new())?;
        let layer: NonNull<Layer> = match alloc_node(&self.allocator, Layer::new(root.as_ptr().cast::<u8>())) {
            Ok(layer) => layer,
            Err(e) => {
                // SAFETY: never published.
                unsafe { free_node(&self.allocator, root) };
                return Err(e);
            }
        };

        let existing: Entry = leaf.entry(slot);
        debug_assert_eq!(existing.keylenx, KSUF_KEYLENX);
        let Some(old_suffix) = NonNull::new(existing.suffix) else {
            unreachable!("suffix slot without a suffix");
        };

        {
            // SAFETY: fresh node, unreachable until set_layer publishes it.
            let root: &Leaf = unsafe { root.as_ref() };
            let root_guard: LockGuard<'_> = root.version().lock();
            // SAFETY: we hold the lock of the slot that owns the suffix.
            let remainder: Key<'_> = Key::new(unsafe { old_suffix.as_ref() }.as_bytes());
            root.insert_entry(&root_guard, 0, Entry::for_key(&remainder, existing.value));
        }

        leaf.set_layer(guard, slot, layer.as_ptr());
        self.retire(Retired::Suffix(old_suffix));

        StatCounters::bump(&self.stats.layers_created);
        debug_log!(ikey = existing.ikey, "layer created");

        // SAFETY: published; retired before it is ever freed.
        Ok(unsafe { layer.as_ref() })
    }

    /// Lock the border node of `upper` holding the layer slot for `ikey`
    /// that points to `layer`.
    ///
    /// Returns the node, its guard and the slot's logical position.
    pub(super) fn lock_border<'a>(
        &'a self,
        upper: &'a Layer,
        ikey: u64,
        layer: &Layer,
    ) -> Option<(&'a Leaf, LockGuard<'a>, usize)> {
        let (border, guard) = self.lock_leaf(upper, ikey)?;
        let target: *mut u8 = node_ptr(layer);

        let perm = border.permutation();
        let pos: usize = (0..perm.size()).find(|&i| {
            let slot: usize = perm.get(i);
            border.ikey(slot) == ikey
                && border.keylenx(slot) == LAYER_KEYLENX
                && border.value_ptr(slot) == target
        })?;

        Some((border, guard, pos))
    }

    /// Remove the empty layer whose root is the locked node `root`.
    pub(super) fn remove_layer<'a>(
        &'a self,
        layer: &'a Layer,
        root: &'a Leaf,
        mut guard: LockGuard<'a>,
        border: &'a Leaf,
        border_guard: &mut LockGuard<'a>,
        pos: usize,
    ) {
        debug_assert_eq!(root.size(), 0);

        let removed: Entry = border.remove_entry(border_guard, pos);
        debug_assert_eq!(removed.value, node_ptr(layer));
        guard.mark_deleted();
        drop(guard);

        self.retire_all([
            Retired::Leaf(NonNull::from(root)),
            Retired::Layer(NonNull::from(layer)),
        ]);
        StatCounters::bump(&self.stats.layers_removed);
        debug_log!(ikey = removed.ikey, "empty layer removed");
    }

    /// Fold the single entry of the layer rooted at the locked node `root`
    /// back into the border slot at `pos`.
    pub(super) fn collapse_layer<'a>(
        &'a self,
        layer: &'a Layer,
        root: &'a Leaf,
        mut guard: LockGuard<'a>,
        border: &'a Leaf,
        border_guard: &mut LockGuard<'a>,
        pos: usize,
    ) {
        let remaining: Entry = root.entry(root.permutation().get(0));
        debug_assert_ne!(remaining.keylenx, LAYER_KEYLENX);

        let mut bytes: Vec<u8> = Vec::with_capacity(IKEY_SIZE * 2);
        if remaining.keylenx == KSUF_KEYLENX {
            extend_with_ikey(&mut bytes, remaining.ikey, IKEY_SIZE);
            if let Some(suffix) = NonNull::new(remaining.suffix) {
                // SAFETY: owned by the locked root node.
                bytes.extend_from_slice(unsafe { suffix.as_ref() }.as_bytes());
            }
        } else {
            extend_with_ikey(&mut bytes, remaining.ikey, usize::from(remaining.keylenx));
        }

        let suffix: NonNull<KeySuffix> = KeySuffix::into_raw(&bytes);
        let slot: usize = border.permutation().get(pos);
        border.set_suffixed(border_guard, slot, remaining.value, suffix.as_ptr());

        guard.mark_deleted();
        drop(guard);

        let old_suffix = NonNull::new(remaining.suffix).map(Retired::Suffix);
        self.retire_all(
            [
                Retired::Leaf(NonNull::from(root)),
                Retired::Layer(NonNull::from(layer)),
            ]
            .into_iter()
            .chain(old_suffix),
        );
        StatCounters::bump(&self.stats.layers_collapsed);
        debug_log!(ikey = border.ikey(slot), "layer collapsed into suffix slot");
    }
}
