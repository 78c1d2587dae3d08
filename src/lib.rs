//! # `masstree-kv`
//!
//! A concurrent ordered key-value index based on a trie of B-link trees.
//!
//! Keys are arbitrary byte strings, consumed eight bytes at a time:
//! - each 8-byte slice is indexed by its own B-link tree (a *layer*)
//! - keys that share a slice and continue past it descend into a sub-layer
//! - border nodes keep logical order in a packed permutation, so an insert
//!   writes a free slot and publishes one word
//!
//! ## Concurrency
//!
//! Every node carries a version word. Readers never lock: they validate the
//! version after reading and retry on change. Writers lock only the node
//! they modify, plus parents during structural changes.
//!
//! ## Memory reclamation
//!
//! Nodes, values and suffixes removed from the structure are retired, not
//! freed. The caller decides when it is safe to free them:
//!
//! ```rust
//! use std::sync::Arc;
//! use masstree_kv::MassTree;
//!
//! let tree: Arc<MassTree<u64>> = Arc::new(MassTree::new());
//!
//! let workers: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         std::thread::spawn(move || {
//!             for i in 0..100u64 {
//!                 let key = (t * 100 + i).to_be_bytes();
//!                 tree.put(&key, i).unwrap();
//!                 assert_eq!(tree.get(&key).as_deref(), Some(&i));
//!             }
//!         })
//!     })
//!     .collect();
//! for w in workers {
//!     w.join().unwrap();
//! }
//!
//! // All workers have finished: nothing retired so far can still be in use.
//! let batch = tree.gc_prepare();
//! // SAFETY: no operation that began before gc_prepare is still running.
//! unsafe { tree.gc(batch) };
//! assert_eq!(tree.len(), 400);
//! ```
//!
//! ## Values
//!
//! Values are stored as `Arc<V>`. `get` returns a clone, which stays valid
//! after the key is overwritten or removed and after `gc`.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

pub mod alloc;
pub mod error;
pub mod internode;
pub mod key;
pub mod layer;
pub mod leaf;
pub mod node;
pub mod nodeversion;
pub mod ordering;
pub mod permuter;
pub mod suffix;
pub mod tree;

mod tracing_helpers;

// Re-export main types for convenience
pub use alloc::reclaim::RetiredBatch;
pub use alloc::{HeapAllocator, NodeAllocator};
pub use error::AllocError;
pub use tree::{MassTree, TreeStats};
