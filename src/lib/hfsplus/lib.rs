//! Read-only decoding of the HFS+ catalog and attributes B-trees.
//!
//! Both trees share one on-disk node format: a 14 byte descriptor, a run of
//! variable-length records, and a table of record offsets at the tail of the
//! node. [`BTree`] handles the generic part (header cache, node reads, floor
//! descent, sibling walks). [`Catalog`] and [`Attributes`] sit on top of it
//! and decode leaf payloads into namespace records and attribute data.
//!
//! All node and fork bytes come from a caller-supplied [`BlockDevice`]. The
//! engine only borrows it and holds no locks of its own: sharing a `Catalog`
//! or `Attributes` between threads is sound exactly when the device is `Sync`.

#![no_std]

#[cfg(not(target_os = "none"))]
extern crate std;

extern crate alloc;

use alloc::string::String;

pub mod attributes;
pub mod btree;
mod bytes;
pub mod catalog;
pub mod device;
pub mod fork;
pub mod internal;
pub mod key;
pub mod node;

pub use crate::attributes::{AttributeData, Attributes};
pub use crate::btree::BTree;
pub use crate::catalog::{
    Catalog, CatalogBody, CatalogFile, CatalogFolder, CatalogRecord, CatalogThread, HardLink,
};
pub use crate::device::BlockDevice;
pub use crate::fork::Fork;
pub use crate::internal::*;
pub use crate::key::{AttributeKey, CatalogKey, HfsName, Key};
pub use crate::node::{IndexNode, IndexRecord, LeafNode, LeafRecord, Node, NodeRecord};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("truncated data: needed {needed} bytes, {available} available")]
    TruncatedData { needed: usize, available: usize },
    #[error("corrupt node {node}: {reason}")]
    CorruptNode { node: u32, reason: &'static str },
    #[error("invalid record key: {0}")]
    InvalidKey(&'static str),
    #[error("unknown record type {0:#x}")]
    UnknownRecordType(u32),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn corrupt(node: u32, reason: &'static str) -> Self {
        Error::CorruptNode { node, reason }
    }
}
