//! Property tests for [`NodeVersion`] lock/unlock sequences.

use masstree_kv::nodeversion::NodeVersion;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Write {
    Plain,
    Insert,
    Split,
    InsertThenSplit,
}

fn write() -> impl Strategy<Value = Write> {
    prop_oneof![
        Just(Write::Plain),
        Just(Write::Insert),
        Just(Write::Split),
        Just(Write::InsertThenSplit),
    ]
}

fn apply(v: &NodeVersion, w: Write) {
    let mut guard = v.lock();
    match w {
        Write::Plain => {}
        Write::Insert => guard.mark_insert(),
        Write::Split => guard.mark_split(),
        Write::InsertThenSplit => {
            guard.mark_insert();
            guard.mark_split();
        }
    }
}

proptest! {
    #[test]
    fn unlock_always_leaves_clean_version(is_leaf: bool, writes in prop::collection::vec(write(), 0..200)) {
        let v = NodeVersion::new(is_leaf);
        for w in writes {
            apply(&v, w);
            prop_assert!(!v.is_locked());
            prop_assert!(!v.is_dirty());
            prop_assert_eq!(v.is_leaf(), is_leaf);
            prop_assert!(!v.is_deleted());
        }
    }

    #[test]
    fn change_detection_matches_write_kind(is_leaf: bool, prefix in prop::collection::vec(write(), 0..100), w in write()) {
        let v = NodeVersion::new(is_leaf);
        for p in prefix {
            apply(&v, p);
        }

        let before = v.stable();
        apply(&v, w);

        match w {
            Write::Plain => {
                prop_assert!(!v.has_changed(before));
            }
            Write::Insert => {
                // The insert counter may carry into the split counter, so
                // only the change itself is guaranteed.
                prop_assert!(v.has_changed(before));
            }
            Write::Split | Write::InsertThenSplit => {
                prop_assert!(v.has_changed(before));
                prop_assert!(v.has_split(before));
                prop_assert!(NodeVersion::split_between(before, v.stable()));
            }
        }
    }

    #[test]
    fn inserts_without_wrap_are_not_splits(n in 1usize..64) {
        let v = NodeVersion::new(true);
        let before = v.stable();
        for _ in 0..n {
            apply(&v, Write::Insert);
        }
        prop_assert!(v.has_changed(before));
        prop_assert!(!v.has_split(before));
    }

    #[test]
    fn deleted_is_sticky(writes in prop::collection::vec(write(), 0..50)) {
        let v = NodeVersion::new(true);
        let before = v.stable();
        v.lock().mark_deleted();

        for w in writes {
            apply(&v, w);
        }
        prop_assert!(v.is_deleted());
        prop_assert!(NodeVersion::value_is_deleted(v.stable()));
        prop_assert!(v.has_split(before));
    }
}
