//! Filepath: src/node.rs
//!
//! Shared node header.
//!
//! Border nodes ([`Leaf`](crate::leaf::Leaf)) and interior nodes
//! ([`Internode`](crate::internode::Internode)) both start with a
//! [`NodeHeader`], so a child pointer stored as `*mut u8` can be inspected
//! through the header before its concrete type is known. The leaf bit of the
//! version word tells the two apart.

use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use crate::internode::Internode;
use crate::nodeversion::NodeVersion;
use crate::ordering::{READ_ORD, WRITE_ORD};

/// Fanout: entries per border node and routing keys per interior node.
pub const WIDTH: usize = 15;

/// Version word and parent link, common to both node kinds.
///
/// The parent pointer is only written while holding the lock of the
/// current parent, or the node's own lock when it has no parent.
#[repr(C)]
#[derive(Debug)]
pub struct NodeHeader {
    version: NodeVersion,
    parent: AtomicPtr<Internode>,
}

impl NodeHeader {
    pub(crate) const fn new(is_leaf: bool) -> Self {
        Self {
            version: NodeVersion::new(is_leaf),
            parent: AtomicPtr::new(StdPtr::null_mut()),
        }
    }

    #[inline(always)]
    pub(crate) const fn version(&self) -> &NodeVersion {
        &self.version
    }

    /// Parent interior node; null for the root of a layer.
    #[inline(always)]
    pub(crate) fn parent(&self) -> *mut Internode {
        self.parent.load(READ_ORD)
    }

    #[inline(always)]
    pub(crate) fn set_parent(&self, parent: *mut Internode) {
        self.parent.store(parent, WRITE_ORD);
    }
}

/// View an untyped node pointer through its header.
///
/// # Safety
///
/// `node` points to a live or retired-but-not-reclaimed `Leaf` or
/// `Internode`, and stays so for `'a`.
#[inline(always)]
pub(crate) unsafe fn header<'a>(node: *mut u8) -> &'a NodeHeader {
    // SAFETY: both node types are repr(C) with the header first.
    unsafe { &*node.cast::<NodeHeader>() }
}
