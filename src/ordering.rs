//! Memory orderings shared by node readers and writers.
//!
//! Readers load every field they interpret with [`READ_ORD`] so the final
//! version re-check cannot be hoisted above the payload loads. Writers store
//! payload with [`WRITE_ORD`] while holding the node lock; the version word
//! itself is handled inside [`crate::nodeversion`].

use std::sync::atomic::Ordering;

/// Optimistic payload loads. Pairs with [`WRITE_ORD`] and with the release
/// fence issued when a dirty bit is set.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Payload stores made under a node lock.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Successful CAS on a sibling link or a lock word.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Failed CAS: only the current value is needed.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Loads and stores whose visibility is already covered by a lock or by a
/// later release store.
pub const RELAXED: Ordering = Ordering::Relaxed;
