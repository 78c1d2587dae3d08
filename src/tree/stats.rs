//! Structural counters.
//!
//! Bumped with relaxed increments where the event happens and read as one
//! [`TreeStats`] snapshot. Values from a snapshot taken while writers run
//! are individually accurate but not mutually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of what the tree has done to its own structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Border nodes split in two.
    pub leaf_splits: u64,
    /// Interior nodes split in two.
    pub internode_splits: u64,
    /// Sub-layers opened on a slice collision.
    pub layers_created: u64,
    /// Sub-layers folded back into a suffix slot.
    pub layers_collapsed: u64,
    /// Empty sub-layers removed.
    pub layers_removed: u64,
    /// Empty border nodes unlinked.
    pub leaves_removed: u64,
    /// Interior nodes left with a single child and spliced out.
    pub internodes_collapsed: u64,
    /// Objects handed to the retire list.
    pub retired: u64,
    /// Retired objects freed.
    pub reclaimed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub(crate) leaf_splits: AtomicU64,
    pub(crate) internode_splits: AtomicU64,
    pub(crate) layers_created: AtomicU64,
    pub(crate) layers_collapsed: AtomicU64,
    pub(crate) layers_removed: AtomicU64,
    pub(crate) leaves_removed: AtomicU64,
    pub(crate) internodes_collapsed: AtomicU64,
    pub(crate) retired: AtomicU64,
    pub(crate) reclaimed: AtomicU64,
}

impl StatCounters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TreeStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);

        TreeStats {
            leaf_splits: get(&self.leaf_splits),
            internode_splits: get(&self.internode_splits),
            layers_created: get(&self.layers_created),
            layers_collapsed: get(&self.layers_collapsed),
            layers_removed: get(&self.layers_removed),
            leaves_removed: get(&self.leaves_removed),
            internodes_collapsed: get(&self.internodes_collapsed),
            retired: get(&self.retired),
            reclaimed: get(&self.reclaimed),
        }
    }
}
