//! Locked writes for [`MassTree`]: `put` and `del`.
//!
//! # Write Protocol
//!
//! ```text
//! 1. Descend optimistically to the border node for the slice
//! 2. node.version.lock(); restart if deleted
//! 3. Move right (unlock, lock next) while slice >= fence
//! 4. Search:
//!    - existing key   -> swap the value pointer
//!    - layer slot     -> unlock, shift the key, descend the sub-layer
//!    - suffix clash   -> open a sub-layer, descend it
//!    - absent, room   -> write a free slot, publish the permutation
//!    - absent, full   -> split
//! 5. Unlock (publishes the new version)
//! ```
//!
//! Lock order: a deeper layer before an upper one, a child before its
//! parent, a node before the fresh nodes it creates.

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::Ordering as AtomicOrdering;

use crate::alloc::NodeAllocator;
use crate::alloc::reclaim::Retired;
use crate::error::AllocError;
use crate::key::Key;
use crate::layer::Layer;
use crate::leaf::{Entry, Leaf, SlotMatch};
use crate::node::WIDTH;
use crate::nodeversion::{LockGuard, NodeVersion, spin_wait};
use crate::tracing_helpers::trace_log;

use super::{MassTree, clone_value};

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Insert or replace `key`.
    ///
    /// Returns the previous value, if any.
    ///
    /// # Errors
    ///
    /// [`AllocError`] when a split or a new layer could not get a node. The
    /// tree is unchanged and `value` is dropped.
    pub fn put(&self, key: &[u8], value: V) -> Result<Option<Arc<V>>, AllocError> {
        self.put_arc(key, Arc::new(value))
    }

    /// [`put`](Self::put) for a value that is already shared.
    ///
    /// # Errors
    ///
    /// [`AllocError`] as for `put`; the tree's reference to `value` is
    /// released.
    pub fn put_arc(&self, key: &[u8], value: Arc<V>) -> Result<Option<Arc<V>>, AllocError> {
        let raw: *mut u8 = Arc::into_raw(value).cast_mut().cast::<u8>();

        self.put_raw(key, raw).inspect_err(|_| {
            // SAFETY: never published, so this is still our reference.
            drop(unsafe { Arc::from_raw(raw.cast::<V>().cast_const()) });
        })
    }

    fn put_raw(&self, key: &[u8], value: *mut u8) -> Result<Option<Arc<V>>, AllocError> {
        let mut spins: u32 = 0;

        'retry: loop {
            let mut cursor: Key<'_> = Key::new(key);
            let mut layer: &Layer = &self.top;

            loop {
                let Some((leaf, mut guard)) = self.lock_leaf(layer, cursor.ikey()) else {
                    spin_wait(&mut spins);
                    continue 'retry;
                };

                match leaf.search(leaf.permutation(), &cursor) {
                    SlotMatch::Found { slot, .. } => {
                        let old: *mut u8 = leaf.swap_value(&guard, slot, value);
                        drop(guard);

                        // SAFETY: `old` was stored by a put and is still the
                        // tree's reference until the retire below.
                        let previous: Arc<V> = unsafe { clone_value::<V>(old) };
                        if let Some(old) = NonNull::new(old) {
                            self.retire(Retired::Value(old));
                        }
                        return Ok(Some(previous));
                    }

                    SlotMatch::Layer { layer: sub, .. } => {
                        drop(guard);
                        cursor.shift();
                        // SAFETY: a layer under a live slot is live or retired.
                        layer = unsafe { &*sub };
                    }

                    SlotMatch::Conflict { slot } => {
                        let sub: &Layer = self.make_new_layer(leaf, &mut guard, slot)?;
                        drop(guard);
                        cursor.shift();
                        layer = sub;
                    }

                    SlotMatch::NotFound { pos } => {
                        if leaf.size() < WIDTH {
                            leaf.insert_entry(&guard, pos, Entry::for_key(&cursor, value));
                            drop(guard);
                        } else {
                            let reserve = self.reserve_split(leaf)?;
                            let entry: Entry = Entry::for_key(&cursor, value);
                            self.split_insert(layer, leaf, guard, pos, entry, reserve);
                        }

                        self.count.fetch_add(1, AtomicOrdering::Relaxed);
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Remove `key`. Returns whether it was present.
    ///
    /// Emptied border nodes are unlinked and emptied sub-layers folded back
    /// into their parent slot before this returns.
    pub fn del(&self, key: &[u8]) -> bool {
        let mut spins: u32 = 0;

        'retry: loop {
            let mut cursor: Key<'_> = Key::new(key);
            let mut layer: &Layer = &self.top;
            let mut path: Vec<(&Layer, u64)> = Vec::new();

            loop {
                let Some((leaf, mut guard)) = self.lock_leaf(layer, cursor.ikey()) else {
                    spin_wait(&mut spins);
                    continue 'retry;
                };

                match leaf.search(leaf.permutation(), &cursor) {
                    SlotMatch::Found { pos, .. } => {
                        let removed: Entry = leaf.remove_entry(&mut guard, pos);
                        self.retire_entry(removed);
                        self.count.fetch_sub(1, AtomicOrdering::Relaxed);

                        self.after_remove(layer, leaf, guard, path);
                        return true;
                    }

                    SlotMatch::Layer { layer: sub, .. } => {
                        drop(guard);
                        path.push((layer, cursor.ikey()));
                        cursor.shift();
                        // SAFETY: a layer under a live slot is live or retired.
                        layer = unsafe { &*sub };
                    }

                    SlotMatch::Conflict { .. } | SlotMatch::NotFound { .. } => return false,
                }
            }
        }
    }

    /// Lock the border node of `layer` that owns `ikey`.
    ///
    /// Returns `None` when the layer has been removed.
    pub(super) fn lock_leaf<'a>(&'a self, layer: &'a Layer, ikey: u64) -> Option<(&'a Leaf, LockGuard<'a>)> {
        let mut spins: u32 = 0;

        'descend: loop {
            let (mut leaf, _) = self.reach_leaf(layer, ikey)?;

            loop {
                let guard: LockGuard<'a> = leaf.version().lock();
                if NodeVersion::value_is_deleted(guard.locked_value()) {
                    drop(guard);
                    spin_wait(&mut spins);
                    continue 'descend;
                }

                let next: *mut Leaf = leaf.next();
                if next.is_null() || ikey < leaf.fence() {
                    return Some((leaf, guard));
                }

                drop(guard);
                trace_log!(ikey, "lock_leaf: moving right");
                // SAFETY: linked nodes are retired before they are freed.
                leaf = unsafe { &*next };
            }
        }
    }

    /// Retire the value and suffix of a removed entry.
    pub(super) fn retire_entry(&self, entry: Entry) {
        let value = NonNull::new(entry.value).map(Retired::Value);
        let suffix = NonNull::new(entry.suffix).map(Retired::Suffix);
        self.retire_all(value.into_iter().chain(suffix));
    }
}
