//! Filepath: src/key.rs
//!
//! Key slicing.
//!
//! A key is consumed eight bytes at a time. Each 8-byte slice ("ikey") is read
//! big-endian and zero-padded, so comparing ikeys as `u64` is the same as
//! comparing the bytes. [`Key`] is the per-operation cursor that walks the
//! slices as the operation descends the trie of layers.

/// Size of an ikey in bytes.
pub const IKEY_SIZE: usize = 8;

/// Read slice `index` of `key` as a big-endian `u64`.
///
/// Total over `index`: slices past the end of the key are `0`, and a short
/// final slice is zero-padded.
///
/// ```rust
/// use masstree_kv::key::slice_at;
///
/// assert_eq!(slice_at(b"hello world!", 0), u64::from_be_bytes(*b"hello wo"));
/// assert_eq!(slice_at(b"hello world!", 1), u64::from_be_bytes(*b"rld!\0\0\0\0"));
/// assert_eq!(slice_at(b"hello world!", 7), 0);
/// ```
#[must_use]
#[inline]
pub fn slice_at(key: &[u8], index: usize) -> u64 {
    index
        .checked_mul(IKEY_SIZE)
        .map_or(0, |offset| read_ikey(key, offset))
}

/// Read up to eight bytes at `offset`, zero-padded.
#[inline]
fn read_ikey(data: &[u8], offset: usize) -> u64 {
    let Some(rest) = data.get(offset..) else {
        return 0;
    };

    let mut bytes: [u8; IKEY_SIZE] = [0u8; IKEY_SIZE];
    let n: usize = rest.len().min(IKEY_SIZE);
    bytes[..n].copy_from_slice(&rest[..n]);

    u64::from_be_bytes(bytes)
}

/// Write the first `len` bytes of `ikey` (big-endian) to `out`.
///
/// Inverse of slicing for an inline key of length `len <= 8`.
#[inline]
pub fn extend_with_ikey(out: &mut Vec<u8>, ikey: u64, len: usize) {
    let bytes: [u8; IKEY_SIZE] = ikey.to_be_bytes();
    out.extend_from_slice(&bytes[..len.min(IKEY_SIZE)]);
}

/// Cursor over the slices of one key.
///
/// ```rust
/// use masstree_kv::key::Key;
///
/// let mut key = Key::new(b"0123456789");
/// assert!(key.has_suffix());
/// assert_eq!(key.suffix(), b"89");
///
/// key.shift();
/// assert_eq!(key.current_len(), 2);
/// assert!(!key.has_suffix());
/// assert_eq!(key.ikey(), u64::from_be_bytes(*b"89\0\0\0\0\0\0"));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Key<'a> {
    /// Full key; never modified.
    data: &'a [u8],

    /// Current slice, cached.
    ikey: u64,

    /// Number of slices consumed by `shift()`; equals the layer depth.
    shift_count: usize,
}

impl<'a> Key<'a> {
    /// Start a cursor at slice 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            ikey: read_ikey(data, 0),
            shift_count: 0,
        }
    }

    /// Full key length.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the full key is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current slice.
    #[inline]
    #[must_use]
    pub const fn ikey(&self) -> u64 {
        self.ikey
    }

    /// Number of slices consumed so far.
    #[inline]
    #[must_use]
    pub const fn shift_count(&self) -> usize {
        self.shift_count
    }

    /// Bytes remaining from the start of the current slice.
    #[inline]
    #[must_use]
    pub const fn current_len(&self) -> usize {
        self.data.len().saturating_sub(self.shift_count * IKEY_SIZE)
    }

    /// Whether the key continues past the current slice.
    #[inline]
    #[must_use]
    pub const fn has_suffix(&self) -> bool {
        self.current_len() > IKEY_SIZE
    }

    /// Bytes after the current slice (empty when `!has_suffix()`).
    #[inline]
    #[must_use]
    pub fn suffix(&self) -> &'a [u8] {
        let start: usize = (self.shift_count + 1) * IKEY_SIZE;
        self.data.get(start..).unwrap_or(&[])
    }

    /// Ordering class of the current slice inside a border node: the inline
    /// length `0..=8`, or `9` when the key continues.
    #[inline]
    #[must_use]
    pub const fn slot_class(&self) -> u8 {
        if self.has_suffix() {
            IKEY_SIZE as u8 + 1
        } else {
            self.current_len() as u8
        }
    }

    /// Advance to the next slice.
    ///
    /// Only meaningful when `has_suffix()`; the caller descends one layer.
    #[inline]
    pub fn shift(&mut self) {
        debug_assert!(self.has_suffix(), "shift past the end of the key");

        self.shift_count += 1;
        self.ikey = read_ikey(self.data, self.shift_count * IKEY_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key() {
        let key = Key::new(b"");
        assert_eq!(key.ikey(), 0);
        assert_eq!(key.current_len(), 0);
        assert_eq!(key.slot_class(), 0);
        assert!(!key.has_suffix());
        assert!(key.suffix().is_empty());
    }

    #[test]
    fn test_short_keys_pad_with_zeros() {
        let key = Key::new(b"ab");
        assert_eq!(key.ikey(), 0x6162_0000_0000_0000);
        assert_eq!(key.slot_class(), 2);
    }

    #[test]
    fn test_same_ikey_different_lengths_differ_by_class() {
        let a = Key::new(b"a");
        let b = Key::new(b"a\0");
        assert_eq!(a.ikey(), b.ikey());
        assert_ne!(a.slot_class(), b.slot_class());
    }

    #[test]
    fn test_exact_eight_bytes_has_no_suffix() {
        let key = Key::new(b"abcdefgh");
        assert!(!key.has_suffix());
        assert_eq!(key.slot_class(), 8);
        assert_eq!(key.ikey(), u64::from_be_bytes(*b"abcdefgh"));
    }

    #[test]
    fn test_shift_walks_slices() {
        let data: &[u8] = b"abcdefghijklmnopqrs";
        let mut key = Key::new(data);
        assert_eq!(key.slot_class(), 9);
        assert_eq!(key.suffix(), b"ijklmnopqrs");

        key.shift();
        assert_eq!(key.shift_count(), 1);
        assert_eq!(key.ikey(), u64::from_be_bytes(*b"ijklmnop"));
        assert_eq!(key.suffix(), b"qrs");

        key.shift();
        assert_eq!(key.current_len(), 3);
        assert_eq!(key.slot_class(), 3);
        assert_eq!(key.ikey(), slice_at(data, 2));
    }

    #[test]
    fn test_slice_at_is_total() {
        assert_eq!(slice_at(b"", 0), 0);
        assert_eq!(slice_at(b"x", usize::MAX), 0);
        assert_eq!(slice_at(&[0xff; 16], 1), u64::MAX);
    }

    #[test]
    fn test_slice_order_matches_byte_order() {
        let keys: [&[u8]; 5] = [b"", b"\x00", b"a", b"ab", b"b"];
        for pair in keys.windows(2) {
            assert!(slice_at(pair[0], 0) <= slice_at(pair[1], 0));
        }
    }

    #[test]
    fn test_extend_with_ikey_roundtrips_inline_keys() {
        let mut out = Vec::new();
        extend_with_ikey(&mut out, slice_at(b"xyz", 0), 3);
        assert_eq!(out, b"xyz");
    }

    #[test]
    fn test_long_keys_have_no_cap() {
        let data = vec![7u8; 1024];
        let mut key = Key::new(&data);
        let mut layers = 1;
        while key.has_suffix() {
            key.shift();
            layers += 1;
        }
        assert_eq!(layers, 128);
        assert_eq!(key.current_len(), 8);
    }
}
