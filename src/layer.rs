//! Filepath: src/layer.rs
//!
//! Layer descriptor.
//!
//! A layer is one B-link tree keyed by one 8-byte slice. The tree's top
//! layer is embedded in [`MassTree`](crate::MassTree); every deeper layer is
//! allocated when two keys first collide on a slice and is pointed to by a
//! layer slot of a border node one level up.
//!
//! The root pointer moves when the root splits or when a single-child
//! interior root collapses. A root that has been marked deleted while still
//! installed means the whole layer is gone.

use std::sync::atomic::AtomicPtr;

use crate::ordering::{READ_ORD, WRITE_ORD};

/// Root pointer of one layer.
#[derive(Debug)]
pub struct Layer {
    root: AtomicPtr<u8>,
}

impl Layer {
    /// A layer rooted at `root` (a `Leaf` or `Internode`).
    pub(crate) const fn new(root: *mut u8) -> Self {
        Self {
            root: AtomicPtr::new(root),
        }
    }

    #[inline(always)]
    pub(crate) fn root(&self) -> *mut u8 {
        self.root.load(READ_ORD)
    }

    /// Install a new root. The caller holds the lock of the node being
    /// replaced or promoted.
    #[inline(always)]
    pub(crate) fn set_root(&self, root: *mut u8) {
        self.root.store(root, WRITE_ORD);
    }
}
