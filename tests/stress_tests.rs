//! Multi-threaded stress tests for `MassTree`.
//!
//! Every worker runs a random mix of put/get/del over a shared key space
//! with a per-thread xorshift stream. Values are derived from keys, so any
//! value a reader sees can be checked without coordination.
//!
//! Run in release mode for meaningful contention:
//! ```bash
//! cargo nextest run --test stress_tests --release
//! MASSTREE_LOG_CONSOLE=0 RUST_LOG=masstree_kv=debug cargo test --features tracing --test stress_tests
//! ```

#![expect(clippy::unwrap_used)]

mod common;

use common::XorShift;
use masstree_kv::MassTree;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Run `worker(thread_index, rng)` on `threads` threads released together.
fn run_workers<F>(threads: usize, worker: F)
where
    F: Fn(usize, &mut XorShift) + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let worker = Arc::new(worker);

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let barrier = Arc::clone(&barrier);
            let worker = Arc::clone(&worker);
            thread::Builder::new()
                .name(format!("stress-{t}"))
                .spawn(move || {
                    let mut rng = XorShift::new(t as u64 + 1);
                    barrier.wait();
                    worker(t, &mut rng);
                })
                .unwrap()
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

/// Remove every key sequentially and check the tree ends empty.
fn drain<I: IntoIterator<Item = Vec<u8>>>(tree: &mut MassTree<u64>, keys: I) {
    for key in keys {
        tree.del(&key);
    }
    assert!(tree.is_empty(), "tree not empty after drain: {tree:?}");
    tree.collect();

    let stats = tree.stats();
    assert_eq!(stats.retired, stats.reclaimed);
}

// =============================================================================
//  Small key space: heavy contention on one or two border nodes
// =============================================================================

#[test]
fn small_keyspace_put_del() {
    common::init_tracing();

    const KEYS: u64 = 32;
    const OPS: usize = 50_000;

    let tree = Arc::new(MassTree::<u64>::new());
    let t = Arc::clone(&tree);

    run_workers(common::worker_count(), move |_, rng| {
        for _ in 0..OPS {
            let key = rng.below(KEYS);
            if rng.below(2) == 0 {
                t.put(&key.to_be_bytes(), key).unwrap();
            } else {
                t.del(&key.to_be_bytes());
            }
        }
    });

    let mut tree = Arc::into_inner(tree).unwrap();
    for key in 0..KEYS {
        if let Some(v) = tree.get(&key.to_be_bytes()) {
            assert_eq!(*v, key);
        }
    }
    drain(&mut tree, (0..KEYS).map(|k| k.to_be_bytes().to_vec()));
}

// =============================================================================
//  Large key space: splits, leaf removal and interior collapse
// =============================================================================

#[test]
fn large_keyspace_mixed() {
    common::init_tracing();

    const KEYS: u64 = 4096;
    const OPS: usize = 100_000;

    let tree = Arc::new(MassTree::<u64>::new());
    let bad_reads = Arc::new(AtomicUsize::new(0));
    let (t, bad) = (Arc::clone(&tree), Arc::clone(&bad_reads));

    run_workers(common::worker_count(), move |_, rng| {
        for _ in 0..OPS {
            let key = rng.below(KEYS);
            match rng.below(4) {
                0 | 1 => {
                    t.put(&key.to_be_bytes(), key).unwrap();
                }
                2 => {
                    t.del(&key.to_be_bytes());
                }
                _ => {
                    if t.get(&key.to_be_bytes()).is_some_and(|v| *v != key) {
                        bad.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    });

    assert_eq!(bad_reads.load(Ordering::Relaxed), 0);

    let mut tree = Arc::into_inner(tree).unwrap();
    let stats = tree.stats();
    assert!(stats.leaf_splits > 0, "{stats:?}");

    let present = (0..KEYS).filter(|k| tree.get(&k.to_be_bytes()).is_some()).count();
    assert_eq!(present, tree.len());
    drain(&mut tree, (0..KEYS).map(|k| k.to_be_bytes().to_vec()));
}

// =============================================================================
//  Two-slice keys: layer creation, collapse and removal under contention
// =============================================================================

fn layered_key(k0: u64, k1: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&k0.to_be_bytes());
    key.extend_from_slice(&k1.to_be_bytes());
    key
}

#[test]
fn layered_keys_mixed() {
    common::init_tracing();

    const FIRST: u64 = 32;
    const SECOND: u64 = 32;
    const OPS: usize = 60_000;

    let tree = Arc::new(MassTree::<u64>::new());
    let bad_reads = Arc::new(AtomicUsize::new(0));
    let (t, bad) = (Arc::clone(&tree), Arc::clone(&bad_reads));

    run_workers(common::worker_count(), move |_, rng| {
        for _ in 0..OPS {
            let (k0, k1) = (rng.below(FIRST), rng.below(SECOND));
            let key = layered_key(k0, k1);
            match rng.below(3) {
                0 => {
                    t.put(&key, k0 ^ k1).unwrap();
                }
                1 => {
                    t.del(&key);
                }
                _ => {
                    if t.get(&key).is_some_and(|v| *v != k0 ^ k1) {
                        bad.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    });

    assert_eq!(bad_reads.load(Ordering::Relaxed), 0);

    let mut tree = Arc::into_inner(tree).unwrap();
    assert!(tree.stats().layers_created > 0);

    let keys: Vec<Vec<u8>> = (0..FIRST)
        .flat_map(|k0| (0..SECOND).map(move |k1| layered_key(k0, k1)))
        .collect();
    for key in &keys {
        if let Some(v) = tree.get(key) {
            let k0 = u64::from_be_bytes(key[..8].try_into().unwrap());
            let k1 = u64::from_be_bytes(key[8..].try_into().unwrap());
            assert_eq!(*v, k0 ^ k1);
        }
    }
    drain(&mut tree, keys);
}

// =============================================================================
//  Periodic reclamation between barrier rounds
// =============================================================================

#[test]
fn periodic_gc_between_rounds() {
    common::init_tracing();

    const KEYS: u64 = 1024;
    const ROUNDS: usize = 20;
    const OPS_PER_ROUND: usize = 2_000;

    let threads = common::worker_count();
    let tree = Arc::new(MassTree::<u64>::new());
    let round_end = Arc::new(Barrier::new(threads));
    let gc_done = Arc::new(Barrier::new(threads));
    let t = Arc::clone(&tree);

    run_workers(threads, move |index, rng| {
        for _ in 0..ROUNDS {
            for _ in 0..OPS_PER_ROUND {
                let key = rng.below(KEYS);
                if rng.below(3) == 0 {
                    t.del(&key.to_be_bytes());
                } else {
                    t.put(&key.to_be_bytes(), key).unwrap();
                }
            }

            // Everyone has finished the round: nothing retired before here
            // is still referenced.
            round_end.wait();
            if index == 0 {
                let batch = t.gc_prepare();
                // SAFETY: all workers are parked on `gc_done`.
                unsafe { t.gc(batch) };
            }
            gc_done.wait();
        }
    });

    let mut tree = Arc::into_inner(tree).unwrap();
    assert!(tree.stats().reclaimed > 0);
    drain(&mut tree, (0..KEYS).map(|k| k.to_be_bytes().to_vec()));
}

// =============================================================================
//  Disjoint writers: nothing written may go missing
// =============================================================================

#[test]
fn disjoint_writers_with_readers() {
    common::init_tracing();

    const PER_THREAD: u64 = 5_000;

    let writers = common::worker_count();
    let tree = Arc::new(MassTree::<u64>::new());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2u64)
        .map(|r| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut rng = XorShift::new(1000 + r);
                while !stop.load(Ordering::Relaxed) {
                    let key = rng.below(PER_THREAD * 8);
                    let bytes = format!("writer/{key:020}").into_bytes();
                    if let Some(v) = tree.get(&bytes) {
                        assert_eq!(*v, key);
                    }
                }
            })
        })
        .collect();

    let t = Arc::clone(&tree);
    run_workers(writers, move |index, _| {
        let base = index as u64 * PER_THREAD;
        for key in base..base + PER_THREAD {
            let bytes = format!("writer/{key:020}").into_bytes();
            assert!(t.put(&bytes, key).unwrap().is_none());
            assert_eq!(t.get(&bytes).as_deref(), Some(&key));
        }
    });

    stop.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().unwrap();
    }

    let tree = Arc::into_inner(tree).unwrap();
    assert_eq!(tree.len(), writers * PER_THREAD as usize);
    for key in 0..writers as u64 * PER_THREAD {
        let bytes = format!("writer/{key:020}").into_bytes();
        assert_eq!(tree.get(&bytes).as_deref(), Some(&key), "missing {key}");
    }
}
