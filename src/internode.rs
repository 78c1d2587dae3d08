//! Filepath: src/internode.rs
//!
//! Interior node for [`MassTree`](crate::MassTree).
//!
//! Interior nodes route a slice to a child. They hold only routing keys and
//! child pointers, always in sorted physical order.
//!
//! # Routing Model
//!
//! ```text
//!         [K0 | K1 | K2]           <- Internode (3 keys, 4 children)
//!        /    |    |    \
//!    C0     C1    C2     C3        <- Children
//!
//!    C0: keys < K0
//!    C1: keys >= K0 and < K1
//!    C2: keys >= K1 and < K2
//!    C3: keys >= K2
//! ```
//!
//! # Thread Safety
//!
//! - **Readers:** read `nkeys`, the keys and one child between `stable()`
//!   and `has_changed()`; retry on change.
//! - **Writers:** hold the lock and call `mark_insert()` (or `mark_split()`)
//!   before rewriting keys or children.

use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64};

use crate::node::{NodeHeader, WIDTH, header};
use crate::nodeversion::NodeVersion;
use crate::ordering::{READ_ORD, WRITE_ORD};

/// Keys kept by the left half of a split interior node. The key at this
/// index moves up to the parent.
const SPLIT_KEEP: usize = WIDTH.div_ceil(2);

/// An interior routing node.
///
/// # Invariants
/// - `nkeys <= WIDTH`, with `nkeys + 1` valid children.
/// - Keys are strictly ascending.
/// - Every child's parent pointer names this node.
#[repr(C, align(64))]
pub struct Internode {
    header: NodeHeader,
    nkeys: AtomicU8,
    ikey: [AtomicU64; WIDTH],
    child: [AtomicPtr<u8>; WIDTH + 1],
}

impl std::fmt::Debug for Internode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Internode")
            .field("nkeys", &self.nkeys())
            .field("has_parent", &!self.header.parent().is_null())
            .finish_non_exhaustive()
    }
}

impl Default for Internode {
    fn default() -> Self {
        Self::new()
    }
}

impl Internode {
    /// An empty interior node with no children.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: NodeHeader::new(false),
            nkeys: AtomicU8::new(0),
            ikey: std::array::from_fn(|_| AtomicU64::new(0)),
            child: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
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

    /// Number of routing keys.
    #[inline(always)]
    #[must_use]
    pub fn nkeys(&self) -> usize {
        (self.nkeys.load(READ_ORD) as usize).min(WIDTH)
    }

    /// Whether another key fits without a split.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.nkeys() >= WIDTH
    }

    #[inline(always)]
    pub(crate) fn ikey(&self, i: usize) -> u64 {
        self.ikey[i].load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn child(&self, i: usize) -> *mut u8 {
        self.child[i].load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn set_child(&self, i: usize, child: *mut u8) {
        self.child[i].store(child, WRITE_ORD);
    }

    fn ptr(&self) -> *mut Self {
        StdPtr::from_ref(self).cast_mut()
    }

    // ========================================================================
    //  Routing
    // ========================================================================

    /// Index of the child covering `ikey`: the number of keys `<= ikey`.
    #[inline]
    pub(crate) fn child_index_for(&self, ikey: u64) -> usize {
        let n: usize = self.nkeys();
        (0..n).take_while(|&i| self.ikey(i) <= ikey).count()
    }

    /// Position of `child` among the children, if present.
    pub(crate) fn find_child(&self, child: *mut u8) -> Option<usize> {
        (0..=self.nkeys()).find(|&i| self.child(i) == child)
    }

    // ========================================================================
    //  Locked Mutation
    // ========================================================================

    /// Fill a fresh root: `left | key | right`.
    pub(crate) fn init_root(&self, left: *mut u8, key: u64, right: *mut u8) {
        self.ikey[0].store(key, WRITE_ORD);
        self.set_child(0, left);
        self.set_child(1, right);
        self.nkeys.store(1, WRITE_ORD);
    }

    /// Insert `key` and `child` to the right of child `idx`.
    ///
    /// The node must not be full; the caller has marked it inserting.
    pub(crate) fn insert_after(&self, idx: usize, key: u64, child: *mut u8) {
        let n: usize = self.nkeys();
        debug_assert!(n < WIDTH, "insert_after on a full internode");
        debug_assert!(idx <= n);

        for i in (idx..n).rev() {
            self.ikey[i + 1].store(self.ikey(i), WRITE_ORD);
            self.set_child(i + 2, self.child(i + 1));
        }
        self.ikey[idx].store(key, WRITE_ORD);
        self.set_child(idx + 1, child);
        self.nkeys.store((n + 1) as u8, WRITE_ORD);
    }

    /// Drop child `idx` together with the key that separates it from its
    /// left neighbour (or from its right one, for child 0).
    ///
    /// The caller has marked the node inserting.
    pub(crate) fn remove_child(&self, idx: usize) {
        let n: usize = self.nkeys();
        debug_assert!(n > 0 && idx <= n);

        let first_key: usize = idx.saturating_sub(1);
        for i in first_key..n - 1 {
            self.ikey[i].store(self.ikey(i + 1), WRITE_ORD);
        }
        for i in idx..n {
            self.set_child(i, self.child(i + 1));
        }
        self.set_child(n, StdPtr::null_mut());
        self.nkeys.store((n - 1) as u8, WRITE_ORD);
    }

    /// Split a full node while inserting `key`/`child` after child `idx`.
    ///
    /// The left half keeps the lower keys, `right` receives the upper ones,
    /// and the middle key is returned for the parent. Moved children are
    /// reparented; `child` is parented to whichever half receives it.
    ///
    /// The caller holds both locks and has marked `self` as splitting.
    pub(crate) fn split_insert(&self, right: &Self, idx: usize, key: u64, child: *mut u8) -> u64 {
        debug_assert!(self.is_full());

        let mut keys: [u64; WIDTH + 1] = [0; WIDTH + 1];
        let mut children: [*mut u8; WIDTH + 2] = [StdPtr::null_mut(); WIDTH + 2];
        for i in 0..=WIDTH {
            keys[i] = match i.cmp(&idx) {
                std::cmp::Ordering::Less => self.ikey(i),
                std::cmp::Ordering::Equal => key,
                std::cmp::Ordering::Greater => self.ikey(i - 1),
            };
        }
        for (i, slot) in children.iter_mut().enumerate() {
            *slot = match i.cmp(&(idx + 1)) {
                std::cmp::Ordering::Less => self.child(i),
                std::cmp::Ordering::Equal => child,
                std::cmp::Ordering::Greater => self.child(i - 1),
            };
        }

        let median: u64 = keys[SPLIT_KEEP];

        let right_ptr: *mut Self = right.ptr();
        for (j, i) in (SPLIT_KEEP + 1..=WIDTH).enumerate() {
            right.ikey[j].store(keys[i], WRITE_ORD);
        }
        for (j, &c) in children[SPLIT_KEEP + 1..].iter().enumerate() {
            right.set_child(j, c);
            // SAFETY: children of a locked node are live.
            unsafe { header(c).set_parent(right_ptr) };
        }
        right.nkeys.store((WIDTH - SPLIT_KEEP) as u8, WRITE_ORD);

        for i in 0..SPLIT_KEEP {
            self.ikey[i].store(keys[i], WRITE_ORD);
        }
        for (i, &c) in children[..=SPLIT_KEEP].iter().enumerate() {
            self.set_child(i, c);
        }
        for i in SPLIT_KEEP + 1..=WIDTH {
            self.set_child(i, StdPtr::null_mut());
        }
        self.nkeys.store(SPLIT_KEEP as u8, WRITE_ORD);

        if idx < SPLIT_KEEP {
            // SAFETY: the caller holds child's lock; it has no parent yet.
            unsafe { header(child).set_parent(self.ptr()) };
        }

        median
    }
}
