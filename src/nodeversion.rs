//! Filepath: src/nodeversion.rs
//!
//! Node version word for optimistic concurrency control.
//!
//! [`NodeVersion`] packs the lock bit, two dirty bits, an insert counter, a
//! split counter and the deleted/leaf flags into one `u32`.
//!
//! # Protocol
//! 1. Readers: `stable()` to get a clean version, read the payload with
//!    acquire loads, then `has_changed()`. On change, re-read or restart.
//! 2. Writers: `lock()` to get a [`LockGuard`], call `mark_insert()` or
//!    `mark_split()` *before* touching reader-visible payload, let the guard
//!    drop. Dropping bumps the matching counter and releases the lock in a
//!    single release store.
//!
//! ```rust
//! use masstree_kv::nodeversion::NodeVersion;
//!
//! let v = NodeVersion::new(true);
//! let before = v.stable();
//! {
//!     let mut guard = v.lock();
//!     guard.mark_insert();
//! }
//! assert!(v.has_changed(before));
//! assert!(!v.has_split(before));
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering, fence};

// ============================================================================
//  Bit Constants
// ============================================================================

/// Lock bit: a writer owns the node.
const LOCK_BIT: u32 = 1 << 0;

/// Inserting bit: slots or routing keys are being rewritten.
const INSERTING_BIT: u32 = 1 << 1;

/// Splitting bit: entries are moving to another node, or the node is dying.
const SPLITTING_BIT: u32 = 1 << 2;

/// Either dirty bit.
const DIRTY_MASK: u32 = INSERTING_BIT | SPLITTING_BIT;

/// Low bit of the insert counter (bits 3..=8).
const VINSERT_LOWBIT: u32 = 1 << 3;

/// Low bit of the split counter (bits 9..=27).
const VSPLIT_LOWBIT: u32 = 1 << 9;

/// Absorbs split counter overflow; always cleared on unlock.
const OVERFLOW_BIT: u32 = 1 << 28;

/// Deleted bit: the node is unreachable for new traversals.
const DELETED_BIT: u32 = 1 << 29;

/// Leaf bit: border node (set) or interior node (clear). Never changes.
const ISLEAF_BIT: u32 = 1 << 31;

/// Unlock after a split: clear lock, dirty bits and the insert counter.
const SPLIT_UNLOCK_MASK: u32 = !(OVERFLOW_BIT | (VSPLIT_LOWBIT - 1));

/// Unlock after an insert: clear lock and dirty bits.
const UNLOCK_MASK: u32 = !(OVERFLOW_BIT | (VINSERT_LOWBIT - 1));

/// Spins between `yield_now` calls in every wait loop of the crate.
pub const SPINS_BEFORE_YIELD: u32 = 64;

/// One step of the crate-wide spin-then-yield backoff.
#[inline]
pub fn spin_wait(spins: &mut u32) {
    *spins = spins.wrapping_add(1);
    if (*spins).is_multiple_of(SPINS_BEFORE_YIELD) {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}

// ============================================================================
//  NodeVersion
// ============================================================================

/// A versioned spin lock embedded at the start of every node.
///
/// # Layout
/// Bit 31: `is_leaf` | Bit 29: `deleted` | Bit 28: overflow | Bits 9-27: split counter
/// Bits 3-8: insert counter | Bit 2: `splitting` | Bit 1: `inserting` | Bit 0: `locked`
#[derive(Debug)]
pub struct NodeVersion {
    value: AtomicU32,
}

// ============================================================================
//  LockGuard
// ============================================================================

/// Proof that the node lock is held.
///
/// Only [`NodeVersion::lock`] and [`NodeVersion::try_lock`] create one.
/// Dropping it publishes the new version, even during unwinding.
///
/// `PhantomData<*mut ()>` keeps the guard on the thread that locked.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the lock"]
pub struct LockGuard<'a> {
    version: &'a NodeVersion,
    locked_value: u32,
    _marker: PhantomData<*mut ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let held: u32 = self.locked_value;

        let new_value: u32 = if held & SPLITTING_BIT != 0 {
            (held + VSPLIT_LOWBIT) & SPLIT_UNLOCK_MASK
        } else {
            // (inserting << 2) == VINSERT_LOWBIT when the inserting bit is set
            (held + ((held & INSERTING_BIT) << 2)) & UNLOCK_MASK
        };

        self.version.value.store(new_value, Ordering::Release);
    }
}

impl LockGuard<'_> {
    /// The version value as currently held, including dirty bits.
    #[inline]
    #[must_use]
    pub const fn locked_value(&self) -> u32 {
        self.locked_value
    }

    /// Announce a payload rewrite. Readers spin until the guard drops.
    #[inline]
    pub fn mark_insert(&mut self) {
        self.set_bits(INSERTING_BIT);
    }

    /// Announce that entries leave this node. Bumps the split counter on drop.
    #[inline]
    pub fn mark_split(&mut self) {
        self.set_bits(SPLITTING_BIT);
    }

    /// Mark the node deleted. Implies a split so every snapshot is invalidated.
    #[inline]
    pub fn mark_deleted(&mut self) {
        self.set_bits(DELETED_BIT | SPLITTING_BIT);
    }

    #[inline]
    fn set_bits(&mut self, bits: u32) {
        if self.locked_value & bits == bits {
            return;
        }

        self.locked_value |= bits;
        self.version
            .value
            .store(self.locked_value, Ordering::Relaxed);

        // Payload stores that follow must not become visible before the dirty bit.
        fence(Ordering::Release);
    }
}

impl NodeVersion {
    /// Create an unlocked version for a border (`true`) or interior node.
    #[must_use]
    pub const fn new(is_leaf: bool) -> Self {
        Self {
            value: AtomicU32::new(if is_leaf { ISLEAF_BIT } else { 0 }),
        }
    }

    // ========================================================================
    //  Flag Accessors
    // ========================================================================

    /// Whether a raw version value belongs to a border node.
    #[inline]
    #[must_use]
    pub const fn value_is_leaf(value: u32) -> bool {
        value & ISLEAF_BIT != 0
    }

    /// Whether a raw version value carries the deleted flag.
    #[inline]
    #[must_use]
    pub const fn value_is_deleted(value: u32) -> bool {
        value & DELETED_BIT != 0
    }

    /// Whether the split counter (or deleted flag) differs between two values.
    #[inline]
    #[must_use]
    pub const fn split_between(old: u32, new: u32) -> bool {
        (old ^ new) >= VSPLIT_LOWBIT
    }

    /// Check if this is a border node.
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        Self::value_is_leaf(self.value.load(Ordering::Relaxed))
    }

    /// Check if this node has been deleted.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        Self::value_is_deleted(self.value.load(Ordering::Acquire))
    }

    /// Check if this node is locked.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        (self.value.load(Ordering::Relaxed) & LOCK_BIT) != 0
    }

    /// Check if either dirty bit is set.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        (self.value.load(Ordering::Relaxed) & DIRTY_MASK) != 0
    }

    /// Raw version value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    // ========================================================================
    //  Optimistic Reads
    // ========================================================================

    /// Spin until no writer has a dirty bit set and return that version.
    #[inline]
    #[must_use]
    pub fn stable(&self) -> u32 {
        let mut spins: u32 = 0;

        loop {
            let value: u32 = self.value.load(Ordering::Acquire);
            if value & DIRTY_MASK == 0 {
                return value;
            }
            spin_wait(&mut spins);
        }
    }

    /// Check if anything but the lock bit changed since `old`.
    ///
    /// Callers load the payload with acquire loads before calling this, so
    /// the load below is ordered after them.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, old: u32) -> bool {
        (old ^ self.value.load(Ordering::Acquire)) > LOCK_BIT
    }

    /// Check if the node split (or was deleted) since `old`.
    #[inline]
    #[must_use]
    pub fn has_split(&self, old: u32) -> bool {
        Self::split_between(old, self.value.load(Ordering::Acquire))
    }

    // ========================================================================
    //  Locking
    // ========================================================================

    /// Acquire the lock, spinning (then yielding) while another writer holds it.
    pub fn lock(&self) -> LockGuard<'_> {
        let mut spins: u32 = 0;

        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            spin_wait(&mut spins);
        }
    }

    /// Acquire the lock if it is free right now.
    #[must_use]
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        let value: u32 = self.value.load(Ordering::Relaxed);
        if value & (LOCK_BIT | DIRTY_MASK) != 0 {
            return None;
        }

        let locked: u32 = value | LOCK_BIT;
        self.value
            .compare_exchange_weak(value, locked, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LockGuard {
                version: self,
                locked_value: locked,
                _marker: PhantomData,
            })
    }
}

impl Default for NodeVersion {
    /// A border node version.
    fn default() -> Self {
        Self::new(true)
    }
}


#[cfg(all(test, loom))]
mod loom_tests;
