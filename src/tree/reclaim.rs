//! Two-phase reclamation and teardown for [`MassTree`].
//!
//! ```text
//! batch = tree.gc_prepare()     // close the open list, start the next epoch
//! ... caller waits until every operation begun before this point is done ...
//! unsafe { tree.gc(batch) }     // free the closed list
//! ```
//!
//! Dropping the tree frees the live structure and everything still on the
//! open list. Batches already handed out stay with their holder.

use crate::alloc::NodeAllocator;
use crate::alloc::reclaim::{Retired, RetiredBatch, free_retired, reclaim_layer};
use crate::tracing_helpers::debug_log;

use super::{MassTree, StatCounters};

impl<V, A: NodeAllocator> MassTree<V, A> {
    /// Close the current retirement list and return it.
    ///
    /// Objects retired after this call go to a fresh list. Nothing is freed.
    pub fn gc_prepare(&self) -> RetiredBatch {
        let batch: RetiredBatch = self.reclaimer.prepare();
        debug_log!(epoch = batch.epoch(), objects = batch.len(), "gc_prepare");
        batch
    }

    /// Free everything in `batch`.
    ///
    /// # Safety
    ///
    /// No thread may still hold a node, value pointer or layer reference it
    /// obtained before the `gc_prepare` call that produced `batch`. Typically
    /// every worker has passed a barrier since then. `Arc<V>` clones already
    /// returned to callers are unaffected.
    ///
    /// # Panics
    ///
    /// If `batch` came from a different tree.
    pub unsafe fn gc(&self, mut batch: RetiredBatch) {
        assert!(
            self.reclaimer.owns(&batch),
            "retired batch handed to a tree that did not produce it"
        );

        let items: Vec<Retired> = batch.take();
        let n: usize = items.len();
        for item in items {
            // SAFETY: quiescence is the caller's contract; each item was
            // retired once by this tree.
            unsafe { free_retired::<V, A>(&self.allocator, item) };
        }

        StatCounters::add(&self.stats.reclaimed, n);
        debug_log!(epoch = batch.epoch(), objects = n, "gc");
    }

    /// Free everything retired so far. `&mut self` rules out concurrent
    /// readers, so no external quiescence is needed.
    pub fn collect(&mut self) {
        let items: Vec<Retired> = self.reclaimer.drain();
        let n: usize = items.len();
        for item in items {
            // SAFETY: exclusive access; nothing can reach retired objects.
            unsafe { free_retired::<V, A>(&self.allocator, item) };
        }
        StatCounters::add(&self.stats.reclaimed, n);
    }

    pub(super) fn retire(&self, item: Retired) {
        StatCounters::bump(&self.stats.retired);
        self.reclaimer.retire(item);
    }

    pub(super) fn retire_all<I: IntoIterator<Item = Retired>>(&self, items: I) {
        let items: Vec<Retired> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        StatCounters::add(&self.stats.retired, items.len());
        self.reclaimer.retire_all(items);
    }
}

impl<V, A: NodeAllocator> Drop for MassTree<V, A> {
    fn drop(&mut self) {
        // SAFETY: &mut self; the live structure is ours and disjoint from
        // the retire list.
        unsafe { reclaim_layer::<V, A>(&self.allocator, self.top.root()) };
        self.collect();
    }
}
