//! Filepath: src/alloc.rs
//!
//! Node allocation capability.
//!
//! Border nodes, interior nodes and layer descriptors are obtained from a
//! [`NodeAllocator`] supplied at tree creation. [`HeapAllocator`] forwards to
//! the global allocator and is the default. Values (`Arc<V>`) and key
//! suffixes always use the global allocator.
//!
//! Structurally removed nodes are not returned to the allocator directly;
//! they go through the retire list in [`reclaim`].

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::AllocError;

pub mod reclaim;

/// Raw memory for tree nodes.
///
/// # Safety
///
/// Implementations must return blocks that are valid for `layout` (size and
/// alignment), not aliased by any other live allocation, and that stay valid
/// until passed back to [`deallocate`](Self::deallocate). The tree may call
/// both methods from any thread.
pub unsafe trait NodeAllocator: Send + Sync {
    /// Allocate a block for `layout`. `layout.size()` is never zero.
    ///
    /// # Errors
    ///
    /// [`AllocError`] when no memory is available. The tree treats this as a
    /// failed operation and leaves its structure unchanged.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Return a block.
    ///
    /// # Safety
    ///
    /// `ptr` came from `allocate` on this allocator with the same `layout`,
    /// and is not used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

// SAFETY: forwards to the global allocator, which upholds the contract.
unsafe impl NodeAllocator for HeapAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0);

        // SAFETY: layout has non-zero size.
        let ptr: *mut u8 = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller passes a block from `allocate` with its layout.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// Allocate a `T` through `alloc` and move `value` into it.
pub(crate) fn alloc_node<T, A: NodeAllocator>(alloc: &A, value: T) -> Result<NonNull<T>, AllocError> {
    let layout: Layout = Layout::new::<T>();
    let ptr: NonNull<T> = match alloc.allocate(layout) {
        Ok(p) => p.cast::<T>(),
        Err(e) => {
            crate::tracing_helpers::warn_log!(size = layout.size(), "node allocation failed");
            return Err(e);
        }
    };

    // SAFETY: fresh block sized and aligned for T.
    unsafe { ptr.as_ptr().write(value) };
    Ok(ptr)
}

/// Drop and free a `T` obtained from [`alloc_node`].
///
/// # Safety
///
/// `ptr` came from `alloc_node::<T>` on `alloc` and is unreachable.
pub(crate) unsafe fn free_node<T, A: NodeAllocator>(alloc: &A, ptr: NonNull<T>) {
    // SAFETY: caller guarantees ownership.
    unsafe {
        std::ptr::drop_in_place(ptr.as_ptr());
        alloc.deallocate(ptr.cast::<u8>(), Layout::new::<T>());
    }
}
