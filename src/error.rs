//! Error types.
//!
//! Allocation failure is the only failure a caller can observe: a missing
//! key is `None`/`false`, and validation or lock contention is retried
//! internally.

use std::alloc::Layout;

/// A [`NodeAllocator`](crate::alloc::NodeAllocator) could not supply memory.
///
/// Returned by `put` when a split or a new layer needed a node and none was
/// available. The tree is unchanged when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("node allocation failed ({} bytes, align {})", .layout.size(), .layout.align())]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    /// Failure for a request of `layout`.
    #[must_use]
    pub const fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// The layout that could not be allocated.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }
}
