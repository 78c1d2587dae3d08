//! Filepath: src/leaf.rs
//!
//! Border node (leaf) for [`MassTree`](crate::MassTree).
//!
//! A border node stores up to [`WIDTH`] entries of one layer. Each slot
//! holds the 8-byte slice (`ikey`), a length tag (`keylenx`), a value pointer
//! and an optional key suffix. Logical order lives in a separate
//! [`Permuter`], so an insert writes a free slot and then publishes one
//! `u64`.
//!
//! # Slot encoding
//!
//! | `keylenx` | meaning | `value` |
//! |---|---|---|
//! | `0..=8` | key ends inside this slice, that many bytes long | `Arc<V>` raw |
//! | [`KSUF_KEYLENX`] | key continues; remaining bytes in `suffix` | `Arc<V>` raw |
//! | [`LAYER_KEYLENX`] | keys with this slice continue in a sub-layer | `*mut Layer` |
//!
//! Inside a node, entries are ordered by `(ikey, class)` where the class is
//! the inline length, or 9 for both suffix and layer slots. Two keys with
//! the same slice that both continue never coexist as suffix slots: the
//! second one turns the slot into a layer.
//!
//! # Sibling links
//!
//! `next`/`prev` chain the border nodes of a layer in key order. `fence` is
//! the range boundary between this node and `next`: every slice in this
//! node is below it and every slice in `next` is at or above it. It is set
//! by a split and widened when a right neighbour is absorbed, but never
//! tightened by a removal, so `next` may hold no slice equal to it. It is
//! only meaningful while `next` is non-null. See [`link`] for how the links
//! change.

use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64};

use crate::key::{IKEY_SIZE, Key};
use crate::layer::Layer;
use crate::node::{NodeHeader, WIDTH};
use crate::nodeversion::{LockGuard, NodeVersion};
use crate::ordering::{CAS_SUCCESS, READ_ORD, WRITE_ORD};
use crate::permuter::Permuter;
use crate::suffix::KeySuffix;

pub mod link;

/// `keylenx` of a slot whose key continues in a [`KeySuffix`].
pub const KSUF_KEYLENX: u8 = 64;

/// `keylenx` of a slot that points to a sub-layer.
pub const LAYER_KEYLENX: u8 = 128;

/// Ordering class of a slot: inline length, or 9 for suffix and layer slots.
#[inline(always)]
#[must_use]
pub const fn slot_class(keylenx: u8) -> u8 {
    if keylenx <= IKEY_SIZE as u8 {
        keylenx
    } else {
        IKEY_SIZE as u8 + 1
    }
}

// ============================================================================
//  Entry
// ============================================================================

/// One slot's contents, detached from any node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Entry {
    pub(crate) ikey: u64,
    pub(crate) keylenx: u8,
    pub(crate) value: *mut u8,
    pub(crate) suffix: *mut KeySuffix,
}

impl Entry {
    /// Entry for the current slice of `key`. Allocates the suffix when the
    /// key continues.
    pub(crate) fn for_key(key: &Key<'_>, value: *mut u8) -> Self {
        let (keylenx, suffix) = if key.has_suffix() {
            (KSUF_KEYLENX, KeySuffix::into_raw(key.suffix()).as_ptr())
        } else {
            (key.slot_class(), StdPtr::null_mut())
        };

        Self {
            ikey: key.ikey(),
            keylenx,
            value,
            suffix,
        }
    }
}

// ============================================================================
//  SlotMatch
// ============================================================================

/// Outcome of looking up one slice in a border node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotMatch {
    /// Exact key at logical position `pos`.
    Found {
        pos: usize,
        slot: usize,
        value: *mut u8,
    },

    /// The slice continues in a sub-layer.
    Layer { layer: *mut Layer },

    /// A suffix slot shares the slice but holds a different remainder.
    Conflict { slot: usize },

    /// Absent; an insert goes to logical position `pos`.
    NotFound { pos: usize },
}

// ============================================================================
//  Leaf
// ============================================================================

/// A border node.
///
/// # Invariants
/// - Live entries (`permutation` positions `0..size`) are strictly ordered
///   by `(ikey, class)`.
/// - Every live `ikey` is below `fence` when `next` is non-null.
/// - A layer slot has a null suffix.
#[repr(C, align(64))]
pub struct Leaf {
    header: NodeHeader,
    permutation: AtomicU64,
    fence: AtomicU64,
    next: AtomicPtr<Leaf>,
    prev: AtomicPtr<Leaf>,
    ikey: [AtomicU64; WIDTH],
    keylenx: [AtomicU8; WIDTH],
    value: [AtomicPtr<u8>; WIDTH],
    suffix: [AtomicPtr<KeySuffix>; WIDTH],
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaf")
            .field("size", &self.size())
            .field("has_next", &!self.next().is_null())
            .field("has_parent", &!self.parent().is_null())
            .finish_non_exhaustive()
    }
}

impl Default for Leaf {
    fn default() -> Self {
        Self::new()
    }
}

impl Leaf {
    /// An empty, unlinked border node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: NodeHeader::new(true),
            permutation: AtomicU64::new(Permuter::<WIDTH>::empty().value()),
            fence: AtomicU64::new(0),
            next: AtomicPtr::new(StdPtr::null_mut()),
            prev: AtomicPtr::new(StdPtr::null_mut()),
            ikey: std::array::from_fn(|_| AtomicU64::new(0)),
            keylenx: std::array::from_fn(|_| AtomicU8::new(0)),
            value: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            suffix: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
        }
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    #[inline(always)]
    pub(crate) const fn header(&self) -> &NodeHeader {
        &self.header
    }

    /// The node's version word.
    #[inline(always)]
    #[must_use]
    pub const fn version(&self) -> &NodeVersion {
        self.header.version()
    }

    #[inline(always)]
    pub(crate) fn parent(&self) -> *mut crate::internode::Internode {
        self.header.parent()
    }

    #[inline(always)]
    pub(crate) fn permutation(&self) -> Permuter<WIDTH> {
        Permuter::from_value(self.permutation.load(READ_ORD))
    }

    #[inline(always)]
    fn set_permutation(&self, perm: Permuter<WIDTH>) {
        self.permutation.store(perm.value(), WRITE_ORD);
    }

    /// Number of live entries.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.permutation().size()
    }

    #[inline(always)]
    pub(crate) fn ikey(&self, slot: usize) -> u64 {
        self.ikey[slot].load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn keylenx(&self, slot: usize) -> u8 {
        self.keylenx[slot].load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn value_ptr(&self, slot: usize) -> *mut u8 {
        self.value[slot].load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn suffix_ptr(&self, slot: usize) -> *mut KeySuffix {
        self.suffix[slot].load(READ_ORD)
    }

    /// Lowest slice owned by `next`. Meaningless while `next` is null.
    #[inline(always)]
    pub(crate) fn fence(&self) -> u64 {
        self.fence.load(READ_ORD)
    }

    /// Right sibling with the mark bit stripped.
    #[inline(always)]
    pub(crate) fn next(&self) -> *mut Self {
        link::unmark_ptr(self.next.load(READ_ORD))
    }

    #[inline(always)]
    pub(crate) fn prev(&self) -> *mut Self {
        self.prev.load(READ_ORD)
    }

    pub(crate) fn entry(&self, slot: usize) -> Entry {
        Entry {
            ikey: self.ikey(slot),
            keylenx: self.keylenx(slot),
            value: self.value_ptr(slot),
            suffix: self.suffix_ptr(slot),
        }
    }

    fn write_slot(&self, slot: usize, entry: Entry) {
        self.ikey[slot].store(entry.ikey, WRITE_ORD);
        self.keylenx[slot].store(entry.keylenx, WRITE_ORD);
        self.value[slot].store(entry.value, WRITE_ORD);
        self.suffix[slot].store(entry.suffix, WRITE_ORD);
    }

    // ========================================================================
    //  Search
    // ========================================================================

    /// Look up the current slice of `key` among the live entries of `perm`.
    ///
    /// Safe to call without the lock: every pointer it follows is either
    /// live or retired, and the caller validates the version afterwards.
    pub(crate) fn search(&self, perm: Permuter<WIDTH>, key: &Key<'_>) -> SlotMatch {
        let target: (u64, u8) = (key.ikey(), key.slot_class());

        for pos in 0..perm.size() {
            let slot: usize = perm.get(pos);
            let keylenx: u8 = self.keylenx(slot);

            match (self.ikey(slot), slot_class(keylenx)).cmp(&target) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Greater => return SlotMatch::NotFound { pos },
                std::cmp::Ordering::Equal => {}
            }

            let value: *mut u8 = self.value_ptr(slot);
            if keylenx == LAYER_KEYLENX {
                return SlotMatch::Layer {
                    layer: value.cast::<Layer>(),
                };
            }
            if keylenx != KSUF_KEYLENX {
                return SlotMatch::Found { pos, slot, value };
            }

            let suffix: *mut KeySuffix = self.suffix_ptr(slot);
            // SAFETY: a suffix is retired before it is freed, and reclamation
            // waits for every operation that could have loaded it.
            let same: bool = !suffix.is_null() && unsafe { (*suffix).matches(key.suffix()) };
            return if same {
                SlotMatch::Found { pos, slot, value }
            } else {
                SlotMatch::Conflict { slot }
            };
        }

        SlotMatch::NotFound { pos: perm.size() }
    }

    // ========================================================================
    //  Locked Mutation
    // ========================================================================

    /// Insert `entry` at logical position `pos`. The node must not be full.
    ///
    /// The entry goes into a free slot first and becomes visible with the
    /// permutation store, so no dirty bit is needed.
    pub(crate) fn insert_entry(&self, _guard: &LockGuard<'_>, pos: usize, entry: Entry) {
        let mut perm: Permuter<WIDTH> = self.permutation();
        let slot: usize = perm.insert_from_back(pos);
        self.write_slot(slot, entry);
        self.set_permutation(perm);
    }

    /// Remove logical position `pos` and hand back its value and suffix.
    pub(crate) fn remove_entry(&self, guard: &mut LockGuard<'_>, pos: usize) -> Entry {
        guard.mark_insert();

        let mut perm: Permuter<WIDTH> = self.permutation();
        let removed: Entry = self.entry(perm.get(pos));
        perm.remove_to_back(pos);
        self.set_permutation(perm);

        removed
    }

    /// Replace the value of a live slot, returning the old pointer.
    pub(crate) fn swap_value(&self, _guard: &LockGuard<'_>, slot: usize, value: *mut u8) -> *mut u8 {
        self.value[slot].swap(value, CAS_SUCCESS)
    }

    /// Turn a suffix slot into a layer slot.
    pub(crate) fn set_layer(&self, guard: &mut LockGuard<'_>, slot: usize, layer: *mut Layer) {
        guard.mark_insert();

        self.value[slot].store(layer.cast::<u8>(), WRITE_ORD);
        self.suffix[slot].store(StdPtr::null_mut(), WRITE_ORD);
        self.keylenx[slot].store(LAYER_KEYLENX, WRITE_ORD);
    }

    /// Turn a layer slot back into a suffix slot holding `value`.
    pub(crate) fn set_suffixed(
        &self,
        guard: &mut LockGuard<'_>,
        slot: usize,
        value: *mut u8,
        suffix: *mut KeySuffix,
    ) {
        guard.mark_insert();

        self.suffix[slot].store(suffix, WRITE_ORD);
        self.value[slot].store(value, WRITE_ORD);
        self.keylenx[slot].store(KSUF_KEYLENX, WRITE_ORD);
    }

    // ========================================================================
    //  Split
    // ========================================================================

    /// Move the upper part of a full node, plus `entry` at logical position
    /// `pos`, into the empty node `right`. Returns the split slice, which
    /// becomes this node's fence.
    ///
    /// The caller holds both locks and has marked this node as splitting.
    pub(crate) fn split_into(&self, right: &Self, pos: usize, entry: Entry) -> u64 {
        let perm: Permuter<WIDTH> = self.permutation();
        debug_assert_eq!(perm.size(), WIDTH, "split_into: node is not full");

        // Logical position i of the merged sequence.
        let merged = |i: usize| -> Entry {
            match i.cmp(&pos) {
                std::cmp::Ordering::Less => self.entry(perm.get(i)),
                std::cmp::Ordering::Equal => entry,
                std::cmp::Ordering::Greater => self.entry(perm.get(i - 1)),
            }
        };

        let ikeys: [u64; WIDTH + 1] = std::array::from_fn(|i| merged(i).ikey);
        let split: usize = choose_split(&ikeys);

        for (slot, i) in (split..=WIDTH).enumerate() {
            right.write_slot(slot, merged(i));
        }
        right.set_permutation(Permuter::make_sorted(WIDTH + 1 - split));

        let mut left: Permuter<WIDTH> = perm;
        if pos >= split {
            left.set_size(split);
        } else {
            left.set_size(split - 1);
            let slot: usize = left.insert_from_back(pos);
            self.write_slot(slot, entry);
        }
        self.set_permutation(left);

        ikeys[split]
    }
}

/// Pick the split point of a merged sequence of `WIDTH + 1` slices: the
/// boundary nearest the middle whose neighbours differ, so entries sharing
/// a slice stay together. Ties prefer the right-hand boundary.
pub(crate) fn choose_split(ikeys: &[u64; WIDTH + 1]) -> usize {
    let mid: usize = ikeys.len() / 2;

    for distance in 0..mid {
        for split in [mid + distance, mid - distance] {
            if (1..ikeys.len()).contains(&split) && ikeys[split - 1] != ikeys[split] {
                return split;
            }
        }
    }

    // Unreachable: at most ten entries share a slice.
    mid
}
