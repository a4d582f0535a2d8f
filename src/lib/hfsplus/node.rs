//! Node decoding: descriptor, offset table, and per-kind records.
//!
//! The last `num_records + 1` big-endian `u16`s of a node are record start
//! offsets, stored back to front: the final `u16` of the node is the offset of
//! record 0, the one before it record 1, and so on, with the free-space offset
//! last. A record spans from its offset to the next one.

use alloc::vec::Vec;

use byteorder::{BigEndian, ByteOrder};

use crate::internal::{BTreeAttributes, HeaderRecord, NodeDescriptor, NodeKind};
use crate::key::Key;
use crate::{Error, Result};

/// Per-tree parameters needed to split records into key and data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    pub node_size: usize,
    /// Set when index keys are padded to the maximum key length.
    pub fixed_index_key_len: Option<usize>,
}

impl NodeLayout {
    pub fn from_header(header: &HeaderRecord) -> Self {
        let fixed_index_key_len = if header
            .attributes()
            .contains(BTreeAttributes::VARIABLE_INDEX_KEYS)
        {
            None
        } else {
            Some(header.max_key_length as usize + 2)
        };
        Self {
            node_size: header.node_size as usize,
            fixed_index_key_len,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexRecord<K> {
    pub key: K,
    /// Node holding keys from `key` up to the next index record's key.
    pub child: u32,
}

#[derive(Debug, Clone)]
pub struct LeafRecord<K> {
    pub key: K,
    /// Undecoded record data following the key.
    pub payload: Vec<u8>,
}

pub enum NodeRecord<K> {
    Index(IndexRecord<K>),
    Leaf(LeafRecord<K>),
}

impl<K> NodeRecord<K> {
    pub fn key(&self) -> &K {
        match self {
            NodeRecord::Index(r) => &r.key,
            NodeRecord::Leaf(r) => &r.key,
        }
    }
}

pub struct IndexNode<K> {
    pub descriptor: NodeDescriptor,
    pub records: Vec<IndexRecord<K>>,
}

impl<K: Key> IndexNode<K> {
    /// The record with the largest key not greater than `key`.
    pub fn floor(&self, key: &K) -> Option<&IndexRecord<K>> {
        let idx = self.records.partition_point(|r| r.key <= *key);
        idx.checked_sub(1).map(|i| &self.records[i])
    }

    /// Child to descend into for `key`. Keys below the node's first key go to
    /// the first child, where a scan can still find records that sort after them.
    pub fn child_for(&self, key: &K) -> u32 {
        self.floor(key)
            .or_else(|| self.records.first())
            .map_or(0, |r| r.child)
    }
}

pub struct LeafNode<K> {
    pub descriptor: NodeDescriptor,
    pub records: Vec<LeafRecord<K>>,
}

pub enum Node<K> {
    Index(IndexNode<K>),
    Leaf(LeafNode<K>),
}

impl<K: Key> Node<K> {
    /// Decodes node number `node` from its raw bytes.
    pub fn parse(node: u32, data: &[u8], layout: &NodeLayout) -> Result<Self> {
        let descriptor = NodeDescriptor::parse(data)?;
        match descriptor.node_kind() {
            Some(NodeKind::Index) => {
                let records = decode_records(node, data, |record| {
                    parse_index_record(node, record, layout)
                })?;
                if records.is_empty() {
                    return Err(Error::corrupt(node, "index node without records"));
                }
                Ok(Node::Index(IndexNode {
                    descriptor,
                    records,
                }))
            }
            Some(NodeKind::Leaf) => {
                let records = decode_records(node, data, |record| parse_leaf_record(node, record))?;
                Ok(Node::Leaf(LeafNode {
                    descriptor,
                    records,
                }))
            }
            Some(NodeKind::Header | NodeKind::Map) => {
                Err(Error::corrupt(node, "header or map node on a search path"))
            }
            None => Err(Error::corrupt(node, "unrecognized node kind")),
        }
    }
}

impl<K> Node<K> {
    pub fn descriptor(&self) -> &NodeDescriptor {
        match self {
            Node::Index(n) => &n.descriptor,
            Node::Leaf(n) => &n.descriptor,
        }
    }

    /// The records in on-disk (ascending key) order.
    pub fn into_records(self) -> Vec<NodeRecord<K>> {
        match self {
            Node::Index(n) => n.records.into_iter().map(NodeRecord::Index).collect(),
            Node::Leaf(n) => n.records.into_iter().map(NodeRecord::Leaf).collect(),
        }
    }
}

/// Reads and validates the offset table, returning `num_records + 1` ascending
/// offsets; the last one is the start of free space.
pub fn record_offsets(node: u32, data: &[u8]) -> Result<Vec<usize>> {
    let descriptor = NodeDescriptor::parse(data)?;
    let count = descriptor.num_records as usize + 1;
    let table_len = count * 2;
    if NodeDescriptor::SIZE + table_len > data.len() {
        return Err(Error::corrupt(node, "offset table overlaps the descriptor"));
    }
    let table_start = data.len() - table_len;

    let mut offsets = Vec::with_capacity(count);
    for idx in 0..count {
        let pos = data.len() - 2 * (idx + 1);
        let offset = BigEndian::read_u16(&data[pos..pos + 2]) as usize;
        let floor = offsets.last().map_or(NodeDescriptor::SIZE, |&prev| prev + 1);
        if offset < floor {
            return Err(Error::corrupt(node, "record offsets are not increasing"));
        }
        if offset > table_start {
            return Err(Error::corrupt(node, "record offset runs into the offset table"));
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Raw bytes of every record, in order.
pub fn record_slices(node: u32, data: &[u8]) -> Result<Vec<&[u8]>> {
    let offsets = record_offsets(node, data)?;
    Ok(offsets.windows(2).map(|w| &data[w[0]..w[1]]).collect())
}

fn decode_records<R>(
    node: u32,
    data: &[u8],
    decode: impl FnMut(&[u8]) -> Result<R>,
) -> Result<Vec<R>> {
    record_slices(node, data)?.into_iter().map(decode).collect()
}

fn parse_key<K: Key>(node: u32, record: &[u8]) -> Result<K> {
    K::parse(record).map_err(|e| {
        tracing::debug!(node, error = %e, "undecodable key");
        Error::corrupt(node, "undecodable record key")
    })
}

fn parse_index_record<K: Key>(
    node: u32,
    record: &[u8],
    layout: &NodeLayout,
) -> Result<IndexRecord<K>> {
    let key: K = parse_key(node, record)?;
    let key_len = layout.fixed_index_key_len.unwrap_or_else(|| key.byte_length());
    let pointer = record
        .get(key_len..key_len + 4)
        .ok_or_else(|| Error::corrupt(node, "index record too short for a child pointer"))?;
    Ok(IndexRecord {
        key,
        child: BigEndian::read_u32(pointer),
    })
}

fn parse_leaf_record<K: Key>(node: u32, record: &[u8]) -> Result<LeafRecord<K>> {
    let key: K = parse_key(node, record)?;
    let payload = record
        .get(key.byte_length()..)
        .ok_or_else(|| Error::corrupt(node, "leaf key longer than its record"))?;
    Ok(LeafRecord {
        key,
        payload: payload.to_vec(),
    })
}
