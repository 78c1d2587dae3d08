//! Loom model of the version lock and the optimistic read protocol.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --release --lib nodeversion::loom_tests`
//!
//! Loom needs its own atomics, so the protocol is restated here in miniature:
//! CAS lock, dirty bit + release fence before payload stores, and a single
//! release store on unlock.

use loom::sync::Arc;
use loom::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use loom::thread;

const LOCK_BIT: u32 = 1 << 0;
const INSERTING_BIT: u32 = 1 << 1;
const DIRTY_MASK: u32 = 0b110;
const VINSERT_LOWBIT: u32 = 1 << 3;

struct LoomNode {
    version: AtomicU32,
    a: AtomicU64,
    b: AtomicU64,
}

impl LoomNode {
    fn new() -> Self {
        Self {
            version: AtomicU32::new(0),
            a: AtomicU64::new(0),
            b: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> u32 {
        loop {
            let v = self.version.load(Ordering::Relaxed);
            if v & (LOCK_BIT | DIRTY_MASK) == 0
                && self
                    .version
                    .compare_exchange_weak(v, v | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return v | LOCK_BIT;
            }
            thread::yield_now();
        }
    }

    fn write(&self, n: u64) {
        let locked = self.lock() | INSERTING_BIT;
        self.version.store(locked, Ordering::Relaxed);
        fence(Ordering::Release);

        self.a.store(n, Ordering::Relaxed);
        self.b.store(n, Ordering::Relaxed);

        let unlocked = (locked + VINSERT_LOWBIT) & !(VINSERT_LOWBIT - 1);
        self.version.store(unlocked, Ordering::Release);
    }

    /// One optimistic read attempt; `None` when validation failed.
    fn try_read(&self) -> Option<(u64, u64)> {
        let v = self.version.load(Ordering::Acquire);
        if v & DIRTY_MASK != 0 {
            return None;
        }
        let a = self.a.load(Ordering::Acquire);
        let b = self.b.load(Ordering::Acquire);
        if (v ^ self.version.load(Ordering::Acquire)) > LOCK_BIT {
            return None;
        }
        Some((a, b))
    }
}

#[test]
fn loom_validated_read_is_never_torn() {
    loom::model(|| {
        let node = Arc::new(LoomNode::new());

        let writer = {
            let node = Arc::clone(&node);
            thread::spawn(move || node.write(1))
        };

        if let Some((a, b)) = node.try_read() {
            assert_eq!(a, b);
        }

        writer.join().unwrap();
        assert_eq!(node.try_read(), Some((1, 1)));
    });
}

#[test]
fn loom_writers_are_serialized() {
    loom::model(|| {
        let node = Arc::new(LoomNode::new());

        let handles: Vec<_> = (1..=2)
            .map(|n| {
                let node = Arc::clone(&node);
                thread::spawn(move || node.write(n))
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let (a, b) = node.try_read().unwrap();
        assert_eq!(a, b);
        assert_eq!(node.version.load(Ordering::Relaxed), 2 * VINSERT_LOWBIT);
    });
}
