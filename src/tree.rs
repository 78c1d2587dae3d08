//! Filepath: src/tree.rs
//! `MassTree` - a concurrent trie of B-link trees.
//!
//! This module provides the [`MassTree`] handle. The operations live in
//! submodules:
//!
//! - `optimistic`: lock-free `get` and the descent shared by writers
//! - `locked`: `put` and `del`
//! - `split`: border and interior splits
//! - `layer`: opening, collapsing and removing sub-layers
//! - `collapse`: removing empty border nodes
//! - `reclaim`: `gc_prepare`, `gc` and teardown

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::alloc::reclaim::Reclaimer;
use crate::alloc::{HeapAllocator, NodeAllocator, alloc_node};
use crate::error::AllocError;
use crate::layer::Layer;
use crate::leaf::Leaf;

mod collapse;
mod layer;
mod locked;
mod optimistic;
mod reclaim;
mod split;
mod stats;



pub use stats::TreeStats;
use stats::StatCounters;

// ============================================================================
//  MassTree
// ============================================================================

/// A concurrent ordered map from byte strings to `Arc<V>`.
///
/// Keys are compared as unsigned byte sequences and may be of any length.
/// All operations take `&self` and may run from any number of threads.
/// Memory of removed nodes and replaced values is held back until the
/// caller runs [`gc_prepare`](Self::gc_prepare) and [`gc`](Self::gc).
///
/// # Type Parameters
///
/// - `V` - The value type; stored and returned as `Arc<V>`
/// - `A` - Node allocator (default: [`HeapAllocator`])
///
/// # Example
///
/// ```rust
/// use masstree_kv::MassTree;
///
/// let tree: MassTree<&str> = MassTree::new();
/// assert_eq!(tree.put(b"5", "X").unwrap(), None);
/// assert_eq!(tree.put(b"5", "Y").unwrap().as_deref(), Some(&"X"));
/// assert_eq!(tree.get(b"5").as_deref(), Some(&"Y"));
/// assert!(tree.del(b"5"));
/// assert!(tree.get(b"5").is_none());
///
/// // Nothing else holds references: free what the updates retired.
/// let batch = tree.gc_prepare();
/// // SAFETY: single-threaded, no reader predates the batch.
/// unsafe { tree.gc(batch) };
/// ```
pub struct MassTree<V, A: NodeAllocator = HeapAllocator> {
    top: Layer,
    allocator: A,
    reclaimer: Reclaimer,
    count: AtomicUsize,
    stats: StatCounters,
    _marker: PhantomData<Arc<V>>,
}

impl<V> MassTree<V> {
    /// Create an empty tree on the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(HeapAllocator)
    }
}

impl<V> Default for MassTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Create an empty tree whose nodes come from `allocator`.
    ///
    /// # Panics
    ///
    /// Aborts through [`std::alloc::handle_alloc_error`] when the allocator
    /// cannot supply the first border node. Use
    /// [`try_with_allocator`](Self::try_with_allocator) to handle that.
    #[must_use]
    pub fn with_allocator(allocator: A) -> Self {
        match Self::try_with_allocator(allocator) {
            Ok(tree) => tree,
            Err(e) => std::alloc::handle_alloc_error(e.layout()),
        }
    }

    /// Create an empty tree whose nodes come from `allocator`.
    ///
    /// # Errors
    ///
    /// [`AllocError`] when the first border node cannot be allocated.
    pub fn try_with_allocator(allocator: A) -> Result<Self, AllocError> {
        let root = alloc_node(&allocator, Leaf::new())?;

        Ok(Self {
            top: Layer::new(root.as_ptr().cast::<u8>()),
            allocator,
            reclaimer: Reclaimer::new(),
            count: AtomicUsize::new(0),
            stats: StatCounters::default(),
            _marker: PhantomData,
        })
    }

    /// Number of keys. Exact when no writer is running.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(AtomicOrdering::Relaxed)
    }

    /// Whether the tree holds no keys.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node allocator.
    #[must_use]
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Structural counters since creation.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        self.stats.snapshot()
    }
}

impl<V, A: NodeAllocator> StdFmt::Debug for MassTree<V, A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("MassTree")
            .field("len", &self.len())
            .field("epoch", &self.reclaimer.epoch())
            .field("pending", &self.reclaimer.pending())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Helpers
// ============================================================================

/// Clone the `Arc<V>` behind a stored value pointer, leaving the tree's
/// reference in place.
///
/// # Safety
///
/// `raw` came from `Arc::<V>::into_raw` and its tree reference has not been
/// reclaimed.
#[inline]
unsafe fn clone_value<V>(raw: *mut u8) -> Arc<V> {
    let ptr: *const V = raw.cast::<V>().cast_const();

    // SAFETY: the tree's reference keeps the count above zero.
    unsafe {
        Arc::increment_strong_count(ptr);
        Arc::from_raw(ptr)
    }
}

#[inline(always)]
fn node_ptr<T>(node: &T) -> *mut u8 {
    StdPtr::from_ref(node).cast_mut().cast::<u8>()
}
