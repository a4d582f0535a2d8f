//! Generic read-only B-tree over a fork.

use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;
use core::ops::ControlFlow;

use crate::device::BlockDevice;
use crate::fork::Fork;
use crate::internal::{HeaderRecord, NodeDescriptor, NodeKind};
use crate::key::Key;
use crate::node::{LeafNode, LeafRecord, Node, NodeLayout};
use crate::{Error, Result};

/// A B-tree stored in `fork`, with its header record cached at open.
///
/// A tree whose fork has no allocated extents has no header at all; every
/// query against it returns an empty result.
pub struct BTree<'d, D: BlockDevice + ?Sized, K> {
    device: &'d D,
    fork: Fork,
    header: Option<HeaderRecord>,
    _key: PhantomData<K>,
}

impl<'d, D: BlockDevice + ?Sized, K: Key> BTree<'d, D, K> {
    pub fn open(device: &'d D, fork: Fork) -> Result<Self> {
        if fork.is_empty() {
            tracing::debug!("tree fork has no extents, treating the tree as empty");
            return Ok(BTree {
                device,
                fork,
                header: None,
                _key: PhantomData,
            });
        }

        let mut buffer = vec![0; NodeDescriptor::SIZE + HeaderRecord::SIZE];
        if fork.len() < buffer.len() as u64 {
            return Err(Error::corrupt(0, "fork too small for a header node"));
        }
        fork.read(device, 0, &mut buffer)?;
        let descriptor = NodeDescriptor::parse(&buffer)?;
        if descriptor.node_kind() != Some(NodeKind::Header) {
            return Err(Error::corrupt(0, "first node is not a header node"));
        }
        let header = HeaderRecord::parse(&buffer)?;
        header.validate()?;
        tracing::debug!(
            node_size = header.node_size,
            depth = header.tree_depth,
            root = header.root_node,
            leaf_records = header.leaf_records,
            "opened b-tree"
        );
        Ok(BTree {
            device,
            fork,
            header: Some(header),
            _key: PhantomData,
        })
    }

    pub fn header(&self) -> Option<&HeaderRecord> {
        self.header.as_ref()
    }

    pub fn fork(&self) -> &Fork {
        &self.fork
    }

    pub fn device(&self) -> &'d D {
        self.device
    }

    /// Reads and decodes node `node_num`. Fails on a tree without a header.
    pub fn get_node(&self, node_num: u32) -> Result<Node<K>> {
        match &self.header {
            Some(header) => self.read_node(header, node_num),
            None => Err(Error::InvalidArgument("tree has no header node".into())),
        }
    }

    fn read_node(&self, header: &HeaderRecord, node_num: u32) -> Result<Node<K>> {
        let node_size = header.node_size as u64;
        let offset = node_num as u64 * node_size;
        if offset + node_size > self.fork.len() {
            return Err(Error::corrupt(node_num, "node lies outside the tree's fork"));
        }
        tracing::trace!(node = node_num, offset, "reading node");
        let mut buffer = vec![0; node_size as usize];
        self.fork.read(self.device, offset, &mut buffer)?;
        Node::parse(node_num, &buffer, &NodeLayout::from_header(header))
    }

    /// Follows index records down to the leaf whose range covers `key`.
    fn descend(&self, header: &HeaderRecord, key: &K) -> Result<Option<(u32, LeafNode<K>)>> {
        if header.is_empty() {
            return Ok(None);
        }
        let mut node_num = header.root_node;
        let mut index_levels = 0u16;
        loop {
            match self.read_node(header, node_num)? {
                Node::Index(index) => {
                    index_levels += 1;
                    if index_levels >= header.tree_depth {
                        return Err(Error::corrupt(node_num, "index deeper than the tree depth"));
                    }
                    let child = index.child_for(key);
                    tracing::trace!(node = node_num, child, "descending");
                    node_num = child;
                }
                Node::Leaf(leaf) => return Ok(Some((node_num, leaf))),
            }
        }
    }

    /// Visits leaf records in key order, starting at the first one not below
    /// `start` and following forward links across leaves, until `visit`
    /// breaks or the last leaf ends. Returns the break value, if any.
    pub fn scan<B>(
        &self,
        start: &K,
        mut visit: impl FnMut(LeafRecord<K>) -> ControlFlow<B>,
    ) -> Result<Option<B>> {
        let Some(header) = &self.header else {
            return Ok(None);
        };
        let Some((mut node_num, mut leaf)) = self.descend(header, start)? else {
            return Ok(None);
        };

        let mut hops = 0u32;
        loop {
            let forward_link = leaf.descriptor.forward_link;
            for record in leaf.records {
                if record.key < *start {
                    continue;
                }
                if let ControlFlow::Break(value) = visit(record) {
                    return Ok(Some(value));
                }
            }
            if forward_link == 0 {
                return Ok(None);
            }

            hops += 1;
            if hops > header.total_nodes {
                return Err(Error::corrupt(node_num, "forward links form a cycle"));
            }
            leaf = match self.read_node(header, forward_link)? {
                Node::Leaf(next) => next,
                Node::Index(_) => {
                    return Err(Error::corrupt(forward_link, "leaf forward link to an index node"));
                }
            };
            node_num = forward_link;
        }
    }

    /// The leaf record whose key equals `key`.
    pub fn get_record(&self, key: &K) -> Result<Option<LeafRecord<K>>> {
        self.scan(key, |record| {
            if record.key == *key {
                ControlFlow::Break(Some(record))
            } else {
                ControlFlow::Break(None)
            }
        })
        .map(Option::flatten)
    }

    /// All leaf records in `[first, last)`, in key order.
    pub fn get_record_range(&self, first: &K, last: &K) -> Result<Vec<LeafRecord<K>>> {
        let mut records = Vec::new();
        self.scan(first, |record| {
            if record.key >= *last {
                return ControlFlow::Break(());
            }
            records.push(record);
            ControlFlow::Continue(())
        })?;
        Ok(records)
    }

    /// All leaf records whose key has primary id `id`, in key order.
    pub fn get_records_with_id(&self, id: u32) -> Result<Vec<LeafRecord<K>>> {
        let mut records = Vec::new();
        self.scan(&K::first_of(id), |record| {
            if record.key.primary_id() != id {
                return ControlFlow::Break(());
            }
            records.push(record);
            ControlFlow::Continue(())
        })?;
        Ok(records)
    }
}
