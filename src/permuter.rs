//! Filepath: src/permuter.rs
//!
//! Slot permutation for border nodes.
//!
//! A [`Permuter`] packs a permutation of slot indices into one `u64`: the low
//! four bits hold the number of live entries, and nibble `i + 1` holds the
//! physical slot of logical position `i`. Positions `0..size()` are live and
//! in key order; the remaining positions list the free slots, with the next
//! slot to hand out at the back.
//!
//! Publishing a new permutation is one atomic store, which is what lets an
//! insert place its entry in a free slot first and make it visible last.

/// Largest width the `u64` encoding can hold (4 bits of size + 15 nibbles).
pub const MAX_WIDTH: usize = 15;

const SIZE_MASK: u64 = 0xF;

/// A permutation of `WIDTH` slot indices plus a live-entry count.
///
/// ```rust
/// use masstree_kv::permuter::Permuter;
///
/// let mut p: Permuter = Permuter::empty();
/// let first = p.insert_from_back(0);
/// let second = p.insert_from_back(0);
/// assert_eq!(p.size(), 2);
/// assert_eq!(p.get(0), second);
/// assert_eq!(p.get(1), first);
///
/// p.remove_to_back(0);
/// assert_eq!(p.size(), 1);
/// assert_eq!(p.back(), second);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Permuter<const WIDTH: usize = 15> {
    value: u64,
}

impl<const WIDTH: usize> Permuter<WIDTH> {
    const WIDTH_CHECK: () = {
        assert!(WIDTH > 0, "WIDTH must be at least 1");
        assert!(WIDTH <= MAX_WIDTH, "WIDTH must fit the u64 encoding");
    };

    /// Bits that belong to the encoding; anything above is scratch.
    const ENCODED_MASK: u64 = if (WIDTH + 1) * 4 >= 64 {
        u64::MAX
    } else {
        (1u64 << ((WIDTH + 1) * 4)) - 1
    };

    /// No live entries; slots are handed out `0, 1, 2, ...`.
    #[must_use]
    pub const fn empty() -> Self {
        let _: () = Self::WIDTH_CHECK;

        // Position i holds slot WIDTH - 1 - i, so back() is slot 0.
        let mut value: u64 = 0;
        let mut i: usize = 0;
        while i < WIDTH {
            value |= ((WIDTH - 1 - i) as u64) << ((i + 1) * 4);
            i += 1;
        }

        Self { value }
    }

    /// `n` live entries in slots `0..n`, in order; `back()` is slot `n`.
    #[must_use]
    pub fn make_sorted(n: usize) -> Self {
        let _: () = Self::WIDTH_CHECK;
        debug_assert!(n <= WIDTH, "make_sorted: {n} > {WIDTH}");

        let mut value: u64 = n as u64;
        for pos in 0..WIDTH {
            let slot: usize = if pos < n { pos } else { WIDTH - 1 - (pos - n) };
            value |= (slot as u64) << ((pos + 1) * 4);
        }

        Self { value }
    }

    /// Rebuild from a value loaded from a node.
    #[inline(always)]
    #[must_use]
    pub const fn from_value(value: u64) -> Self {
        Self { value }
    }

    /// Raw encoding, for storing into a node.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Number of live entries.
    #[inline(always)]
    #[must_use]
    pub const fn size(&self) -> usize {
        (self.value & SIZE_MASK) as usize
    }

    /// Physical slot at logical position `i`.
    #[inline(always)]
    #[must_use]
    pub const fn get(&self, i: usize) -> usize {
        debug_assert!(i < WIDTH, "get: position out of range");

        ((self.value >> ((i + 1) * 4)) & 0xF) as usize
    }

    /// Next free slot.
    #[inline(always)]
    #[must_use]
    pub const fn back(&self) -> usize {
        self.get(WIDTH - 1)
    }

    /// Truncate to the first `n` live entries. The dropped entries' slots
    /// join the free region, the last dropped one at the back.
    #[inline]
    pub fn set_size(&mut self, n: usize) {
        debug_assert!(n <= self.size(), "set_size can only shrink");

        self.value = (self.value & !SIZE_MASK) | n as u64;
    }

    /// Take the back slot and make it live at position `i`.
    ///
    /// Positions `i..size()` move up by one. Returns the slot.
    #[must_use]
    pub fn insert_from_back(&mut self, i: usize) -> usize {
        debug_assert!(i <= self.size(), "insert_from_back: position past size");
        debug_assert!(self.size() < WIDTH, "insert_from_back: full");

        let slot: usize = self.back();
        let at: usize = (i + 1) * 4;
        let keep: u64 = (1u64 << at) - 1;

        // size + 1 and positions < i | the slot at i | positions >= i shifted up.
        // The old back nibble is shifted out of the encoding.
        self.value = (((self.value + 1) & keep)
            | ((slot as u64) << at)
            | ((self.value << 4) & !(keep | (0xF << at))))
            & Self::ENCODED_MASK;

        #[cfg(debug_assertions)]
        self.debug_assert_valid();

        slot
    }

    /// Remove live position `i`; its slot goes to the back of the free list.
    pub fn remove_to_back(&mut self, i: usize) {
        debug_assert!(i < self.size(), "remove_to_back: position past size");

        let x: u64 = self.value & Self::ENCODED_MASK;
        let at: usize = (i + 1) * 4;
        let high: u64 = !((1u64 << at) - 1);
        let to_back: usize = (WIDTH - 1 - i) * 4;

        // size - 1 and positions < i | positions > i shifted down | slot i at the back.
        self.value = (((x - 1) & !high) | ((x >> 4) & high) | ((x & high) << to_back))
            & Self::ENCODED_MASK;

        #[cfg(debug_assertions)]
        self.debug_assert_valid();
    }

    /// Every slot appears exactly once.
    #[cfg(debug_assertions)]
    pub fn debug_assert_valid(&self) {
        let mut seen: u32 = 0;
        for i in 0..WIDTH {
            let slot: usize = self.get(i);
            assert!(slot < WIDTH, "slot {slot} out of range in {:#x}", self.value);
            assert!(seen & (1 << slot) == 0, "slot {slot} repeated in {:#x}", self.value);
            seen |= 1 << slot;
        }
        assert!(self.size() <= WIDTH);
    }
}

impl<const WIDTH: usize> Default for Permuter<WIDTH> {
    fn default() -> Self {
        Self::empty()
    }
}
