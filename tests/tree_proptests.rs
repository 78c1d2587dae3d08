//! Differential tests of [`MassTree`] against `BTreeMap`.
//!
//! Keys are drawn from small alphabets over a few shared prefixes so that
//! slice collisions, sub-layers and their collapse are exercised, not just
//! single-layer inserts.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use masstree_kv::MassTree;
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
//  Strategies
// ============================================================================

/// Up to 8 bytes: always stored inline in the top layer.
fn short_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(0u8), Just(b'a'), Just(b'b'), any::<u8>()], 0..=8)
}

/// One of a few 0-24 byte prefixes plus a short tail; collides on purpose.
fn layered_key() -> impl Strategy<Value = Vec<u8>> {
    let prefix = prop_oneof![
        Just(Vec::new()),
        Just(b"abcdefgh".to_vec()),
        Just(b"abcdefgh\0\0\0\0\0\0\0\0".to_vec()),
        Just(b"abcdefghijklmnopqrstuvwx".to_vec()),
    ];
    let tail = prop::collection::vec(prop_oneof![Just(0u8), Just(b'x'), Just(b'y')], 0..=10);
    (prefix, tail).prop_map(|(mut p, t)| {
        p.extend(t);
        p
    })
}

fn any_key() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![short_key(), layered_key()]
}

#[derive(Debug, Clone)]
enum Op {
    Put(Vec<u8>, u32),
    Get(Vec<u8>),
    Del(Vec<u8>),
    Gc,
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            6 => (any_key(), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
            3 => any_key().prop_map(Op::Get),
            4 => any_key().prop_map(Op::Del),
            1 => Just(Op::Gc),
        ],
        0..=max_ops,
    )
}

fn check_all(tree: &MassTree<u32>, oracle: &BTreeMap<Vec<u8>, u32>) -> Result<(), TestCaseError> {
    prop_assert_eq!(tree.len(), oracle.len());
    for (k, v) in oracle {
        let got = tree.get(k);
        prop_assert_eq!(got.as_deref(), Some(v), "key {:?}", k);
    }
    Ok(())
}

// ============================================================================
//  Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn matches_btreemap(ops in operations(300)) {
        let tree: MassTree<u32> = MassTree::new();
        let mut oracle: BTreeMap<Vec<u8>, u32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let previous = tree.put(&k, v).unwrap().map(|a| *a);
                    prop_assert_eq!(previous, oracle.insert(k, v));
                }
                Op::Get(k) => {
                    let got = tree.get(&k);
                    prop_assert_eq!(got.as_deref(), oracle.get(&k));
                }
                Op::Del(k) => {
                    prop_assert_eq!(tree.del(&k), oracle.remove(&k).is_some());
                    prop_assert!(tree.get(&k).is_none());
                }
                Op::Gc => {
                    let batch = tree.gc_prepare();
                    // SAFETY: single-threaded.
                    unsafe { tree.gc(batch) };
                }
            }
        }

        check_all(&tree, &oracle)?;
    }

    #[test]
    fn insert_then_delete_everything(keys in prop::collection::btree_set(any_key(), 0..200)) {
        let mut tree: MassTree<u32> = MassTree::new();
        let oracle: BTreeMap<Vec<u8>, u32> = keys.iter().cloned().zip(0..).collect();

        for (k, v) in &oracle {
            prop_assert!(tree.put(k, *v).unwrap().is_none());
        }
        check_all(&tree, &oracle)?;

        for k in oracle.keys().rev() {
            prop_assert!(tree.del(k));
        }
        prop_assert!(tree.is_empty());
        for k in oracle.keys() {
            prop_assert!(tree.get(k).is_none());
        }

        // Every sub-layer was folded away or removed.
        let stats = tree.stats();
        prop_assert_eq!(stats.layers_created, stats.layers_collapsed + stats.layers_removed);

        tree.collect();
        let stats = tree.stats();
        prop_assert_eq!(stats.retired, stats.reclaimed);
    }

    #[test]
    fn prefixes_are_distinct_keys(base in layered_key(), cut in 0usize..24) {
        let tree: MassTree<usize> = MassTree::new();
        let cut = cut.min(base.len());

        tree.put(&base, base.len()).unwrap();
        tree.put(&base[..cut], cut).unwrap();

        let whole = tree.get(&base);
        let prefix = tree.get(&base[..cut]);
        prop_assert_eq!(whole.as_deref(), Some(&base.len()));
        prop_assert_eq!(prefix.as_deref(), Some(&cut));
        prop_assert_eq!(tree.len(), if cut == base.len() { 1 } else { 2 });
    }
}
