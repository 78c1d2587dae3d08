//! Deferred reclamation with caller-driven epochs.
//!
//! This module provides:
//! - The lock-free retire list every structural change appends to
//! - [`RetiredBatch`], the closed list returned by `gc_prepare`
//! - Freeing of retired objects and whole-tree teardown
//!
//! Nothing here knows when readers are gone. The caller establishes that
//! (a barrier, a grace period) between `gc_prepare` and `gc`.

// We cast *mut u8 to node types with stricter alignment. All nodes come
// from `alloc_node` with their own layout.
#![allow(clippy::cast_ptr_alignment)]

use std::ptr::{self as StdPtr, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::alloc::{NodeAllocator, free_node};
use crate::internode::Internode;
use crate::layer::Layer;
use crate::leaf::{LAYER_KEYLENX, Leaf};
use crate::node::header;
use crate::suffix::KeySuffix;
use crate::tracing_helpers::{debug_log, warn_log};

/// Source of per-tree owner tags, so a batch cannot be freed by a tree that
/// did not produce it.
static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

// ============================================================================
//  Retired
// ============================================================================

/// An object unlinked from the tree but possibly still seen by readers.
#[derive(Debug)]
pub(crate) enum Retired {
    Leaf(NonNull<Leaf>),
    Internode(NonNull<Internode>),
    Layer(NonNull<Layer>),
    /// `Arc<V>` raw pointer; the tree's strong count.
    Value(NonNull<u8>),
    Suffix(NonNull<KeySuffix>),
}

// SAFETY: retired objects are unreachable for new operations and are only
// freed by the thread that calls `gc`/`collect`/`drop`.
unsafe impl Send for Retired {}

// ============================================================================
//  RetiredBatch
// ============================================================================

/// A closed retirement list, as returned by
/// [`MassTree::gc_prepare`](crate::MassTree::gc_prepare).
///
/// Pass it to [`MassTree::gc`](crate::MassTree::gc) on the same tree once no
/// thread can still hold a reference obtained before `gc_prepare`. The batch
/// is move-only, so it is consumed at most once. Dropping it without `gc`
/// leaks its contents.
#[must_use = "a batch that is never passed to `gc` leaks its contents"]
#[derive(Debug)]
pub struct RetiredBatch {
    owner: u64,
    epoch: u64,
    items: Vec<Retired>,
}

impl RetiredBatch {
    /// Epoch the batch closed: the number of earlier `gc_prepare` calls on
    /// its tree.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of retired objects in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) const fn owner(&self) -> u64 {
        self.owner
    }

    pub(crate) fn take(&mut self) -> Vec<Retired> {
        std::mem::take(&mut self.items)
    }
}

impl Drop for RetiredBatch {
    fn drop(&mut self) {
        if !self.items.is_empty() {
            warn_log!(
                epoch = self.epoch,
                leaked = self.items.len(),
                "retired batch dropped without gc"
            );
        }
    }
}

// ============================================================================
//  Reclaimer
// ============================================================================

/// One link of the open list.
struct RetireNode {
    item: Retired,
    next: *mut RetireNode,
}

/// The open retirement list of one tree.
///
/// Retiring is a CAS push onto a Treiber stack, so writers never block each
/// other. `prepare` detaches the whole stack with one `swap`. Concurrent
/// `prepare` calls are serialized by `collector` so epochs follow swap order;
/// retirers never touch that lock.
pub(crate) struct Reclaimer {
    head: AtomicPtr<RetireNode>,
    epoch: AtomicU64,
    /// Pushed but not yet taken. Incremented before the push, so it never
    /// drops below what `prepare` subtracts.
    pending: AtomicUsize,
    collector: Mutex<()>,
    owner: u64,
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("epoch", &self.epoch())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Reclaimer {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(StdPtr::null_mut()),
            epoch: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            collector: Mutex::new(()),
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Append one object.
    pub(crate) fn retire(&self, item: Retired) {
        let node: *mut RetireNode = Box::into_raw(Box::new(RetireNode {
            item,
            next: StdPtr::null_mut(),
        }));
        self.pending.fetch_add(1, Ordering::Relaxed);

        // SAFETY: `node` is ours until the CAS publishes it.
        unsafe { self.push_chain(node, node) };
    }

    /// Append several objects with a single CAS.
    pub(crate) fn retire_all<I: IntoIterator<Item = Retired>>(&self, items: I) {
        let mut first: *mut RetireNode = StdPtr::null_mut();
        let mut last: *mut RetireNode = StdPtr::null_mut();
        let mut n: usize = 0;

        for item in items {
            first = Box::into_raw(Box::new(RetireNode { item, next: first }));
            if last.is_null() {
                last = first;
            }
            n += 1;
        }
        if n == 0 {
            return;
        }
        self.pending.fetch_add(n, Ordering::Relaxed);

        // SAFETY: the chain `first..=last` is private until published.
        unsafe { self.push_chain(first, last) };
    }

    /// Splice the private chain `first..=last` onto the stack.
    ///
    /// # Safety
    ///
    /// `first` reaches `last` through `next`, and no other thread can see
    /// any node of the chain.
    unsafe fn push_chain(&self, first: *mut RetireNode, last: *mut RetireNode) {
        let mut head: *mut RetireNode = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `last` is still private.
            unsafe { (*last).next = head };
            match self
                .head
                .compare_exchange_weak(head, first, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Close the open list and start the next epoch.
    pub(crate) fn prepare(&self) -> RetiredBatch {
        let _collector = self.collector.lock();
        let head: *mut RetireNode = self.head.swap(StdPtr::null_mut(), Ordering::Acquire);
        let epoch: u64 = self.epoch.fetch_add(1, Ordering::Relaxed);

        // SAFETY: the swap made the detached chain ours.
        let items: Vec<Retired> = unsafe { take_chain(head) };
        self.pending.fetch_sub(items.len(), Ordering::Relaxed);

        RetiredBatch {
            owner: self.owner,
            epoch,
            items,
        }
    }

    pub(crate) const fn owns(&self, batch: &RetiredBatch) -> bool {
        batch.owner() == self.owner
    }

    /// Take everything still open. Only for callers with exclusive access.
    pub(crate) fn drain(&mut self) -> Vec<Retired> {
        let head: *mut RetireNode = std::mem::replace(self.head.get_mut(), StdPtr::null_mut());
        *self.pending.get_mut() = 0;
        // SAFETY: &mut self; the chain is unreachable by anyone else.
        unsafe { take_chain(head) }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        let leaked: usize = self.drain().len();
        if leaked > 0 {
            warn_log!(leaked, "reclaimer dropped with retired objects");
        }
    }
}

/// Unpack a detached chain into its items, freeing the links.
///
/// # Safety
///
/// `head` is null or the first node of a chain no other thread can reach.
unsafe fn take_chain(mut head: *mut RetireNode) -> Vec<Retired> {
    let mut items: Vec<Retired> = Vec::new();
    while !head.is_null() {
        // SAFETY: every node came from `Box::into_raw` and is visited once.
        let node: Box<RetireNode> = unsafe { Box::from_raw(head) };
        head = node.next;
        items.push(node.item);
    }
    items
}

// ============================================================================
//  Freeing
// ============================================================================

/// Free one retired object.
///
/// # Safety
///
/// No thread can still reach `item`, and it is freed only once. `V` and
/// `alloc` are the value type and allocator of the tree that retired it.
pub(crate) unsafe fn free_retired<V, A: NodeAllocator>(alloc: &A, item: Retired) {
    // SAFETY: forwarded from the caller.
    unsafe {
        match item {
            Retired::Leaf(p) => free_node(alloc, p),
            Retired::Internode(p) => free_node(alloc, p),
            Retired::Layer(p) => free_node(alloc, p),
            Retired::Value(p) => drop(Arc::<V>::from_raw(p.as_ptr().cast::<V>().cast_const())),
            Retired::Suffix(p) => KeySuffix::free(p),
        }
    }
}

/// Free every node, value, suffix and sub-layer reachable from `root`.
///
/// Does not follow sibling links, only parent-to-child edges and layer
/// slots. The [`Layer`] owning `root` itself is left to the caller.
///
/// # Safety
///
/// The structure under `root` is unreachable by any other thread and none of
/// it has been retired.
pub(crate) unsafe fn reclaim_layer<V, A: NodeAllocator>(alloc: &A, root: *mut u8) -> usize {
    let mut freed: usize = 0;
    let mut stack: Vec<*mut u8> = Vec::with_capacity(64);
    if !root.is_null() {
        stack.push(root);
    }

    while let Some(node) = stack.pop() {
        // SAFETY: every pointer on the stack is a live node we own.
        unsafe {
            if header(node).version().is_leaf() {
                let leaf: NonNull<Leaf> = NonNull::new_unchecked(node.cast::<Leaf>());
                let perm = leaf.as_ref().permutation();

                for i in 0..perm.size() {
                    let entry = leaf.as_ref().entry(perm.get(i));
                    if entry.keylenx == LAYER_KEYLENX {
                        let layer: NonNull<Layer> = NonNull::new_unchecked(entry.value.cast::<Layer>());
                        stack.push(layer.as_ref().root());
                        free_node(alloc, layer);
                    } else if let Some(value) = NonNull::new(entry.value) {
                        free_retired::<V, A>(alloc, Retired::Value(value));
                    }
                    if let Some(suffix) = NonNull::new(entry.suffix) {
                        KeySuffix::free(suffix);
                    }
                }

                free_node(alloc, leaf);
            } else {
                let inode: NonNull<Internode> = NonNull::new_unchecked(node.cast::<Internode>());
                for i in 0..=inode.as_ref().nkeys() {
                    let child: *mut u8 = inode.as_ref().child(i);
                    if !child.is_null() {
                        stack.push(child);
                    }
                }

                free_node(alloc, inode);
            }
        }
        freed += 1;
    }

    debug_log!(nodes = freed, "layer torn down");
    freed
}
