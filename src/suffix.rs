//! Filepath: src/suffix.rs
//!
//! Suffix storage for keys longer than one slice.
//!
//! When a key continues past the current 8-byte slice and no other key in the
//! node shares that slice, the remaining bytes are kept in a [`KeySuffix`]
//! hanging off the slot instead of opening a new layer.
//!
//! A suffix is immutable once published. Replacing or removing one retires
//! the old allocation, so an optimistic reader that loaded the pointer can
//! still compare against it until the next reclamation.

use std::ptr::NonNull;

/// Heap copy of a key's remaining bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct KeySuffix(Box<[u8]>);

impl KeySuffix {
    /// Allocate a suffix and leak it into a raw pointer for slot storage.
    pub(crate) fn into_raw(bytes: &[u8]) -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self(bytes.into()))))
    }

    /// Reclaim a pointer produced by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// `ptr` came from `into_raw`, is unreachable, and is not freed twice.
    pub(crate) unsafe fn free(ptr: NonNull<Self>) {
        // SAFETY: caller guarantees unique ownership.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }

    /// The stored bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the stored bytes equal `other`.
    #[inline]
    #[must_use]
    pub fn matches(&self, other: &[u8]) -> bool {
        *self.0 == *other
    }
}
