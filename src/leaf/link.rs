//! Concurrent border-node link maintenance with the mark-bit protocol.
//!
//! A writer that is about to change `x.next` first sets the low bit of that
//! pointer with a CAS. Only one writer can hold the mark, so a split of `x`
//! and the unlink of `x`'s right sibling never interleave on the same link.
//! Readers strip the mark and otherwise ignore it.
//!
//! `prev` and `fence` are only written while the writer holds the mark on
//! the `next` link they relate to.

use std::ptr as StdPtr;

use crate::nodeversion::spin_wait;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, WRITE_ORD};

use super::Leaf;

const MARK_BIT: usize = 1;

/// Set mark bit (provenance-safe).
#[inline]
pub fn mark_ptr<T>(p: *mut T) -> *mut T {
    p.map_addr(|a| a | MARK_BIT)
}

/// Clear mark bit (provenance-safe).
#[inline]
pub fn unmark_ptr<T>(p: *mut T) -> *mut T {
    p.map_addr(|a| a & !MARK_BIT)
}

/// Check if marked.
#[inline]
pub fn is_marked<T>(p: *mut T) -> bool {
    p.addr() & MARK_BIT != 0
}

impl Leaf {
    /// Take the mark on `self.next` and return the unmarked successor.
    ///
    /// A null link is never marked: with `self` locked, nothing else can
    /// make it non-null.
    fn lock_next(&self) -> *mut Self {
        let mut spins: u32 = 0;

        loop {
            let next: *mut Self = self.next.load(READ_ORD);
            if next.is_null() {
                return next;
            }
            if !is_marked(next)
                && self
                    .next
                    .compare_exchange(next, mark_ptr(next), CAS_SUCCESS, CAS_FAILURE)
                    .is_ok()
            {
                return next;
            }
            spin_wait(&mut spins);
        }
    }

    /// Splice `sibling` in right after `self`, which now ends at `split`.
    ///
    /// # Safety
    ///
    /// - The caller holds the locks of `self` and `sibling` and has marked
    ///   `self` as splitting.
    /// - `sibling` is a fresh node holding the entries at or above `split`.
    pub(crate) unsafe fn link_split(&self, sibling: *mut Self, split: u64) {
        let next: *mut Self = self.lock_next();

        // SAFETY: sibling is fresh and owned by the caller until published.
        let sib: &Self = unsafe { &*sibling };
        sib.prev.store(StdPtr::from_ref(self).cast_mut(), WRITE_ORD);
        sib.next.store(next, WRITE_ORD);
        sib.fence.store(self.fence.load(READ_ORD), WRITE_ORD);

        self.fence.store(split, WRITE_ORD);
        if !next.is_null() {
            // SAFETY: the mark keeps next linked, so it is not yet retired.
            unsafe { (*next).prev.store(sibling, WRITE_ORD) };
        }

        // Publishes the sibling and drops the mark in one store.
        self.next.store(sibling, WRITE_ORD);
    }

    /// Remove `self` from the sibling chain.
    ///
    /// With `absorb`, the left neighbour takes over this node's key range
    /// (its fence becomes ours). Otherwise the right neighbour does, which
    /// needs no fence change.
    ///
    /// # Safety
    ///
    /// The caller holds `self`'s lock, has marked it deleted, and holds the
    /// parent lock that serializes removals of neighbouring children.
    pub(crate) unsafe fn unlink(&self, absorb: bool) {
        let me: *mut Self = StdPtr::from_ref(self).cast_mut();
        let next: *mut Self = self.lock_next();

        let mut spins: u32 = 0;
        let prev: *mut Self = loop {
            let prev: *mut Self = self.prev();
            if prev.is_null() {
                break prev;
            }

            // SAFETY: prev links to self, so it is not retired.
            let claimed: bool = unsafe {
                (*prev)
                    .next
                    .compare_exchange(me, mark_ptr(me), CAS_SUCCESS, CAS_FAILURE)
                    .is_ok()
            };
            if claimed {
                break prev;
            }
            spin_wait(&mut spins);
        };

        if !next.is_null() {
            // SAFETY: marked by us above.
            unsafe { (*next).prev.store(prev, WRITE_ORD) };
        }

        if !prev.is_null() {
            // SAFETY: we hold the mark on prev.next.
            unsafe {
                if absorb {
                    (*prev).fence.store(self.fence.load(READ_ORD), WRITE_ORD);
                }
                (*prev).next.store(next, WRITE_ORD);
            }
        }
    }
}
