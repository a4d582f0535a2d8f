//! Builds small HFS+ B-tree images in memory.
#![allow(dead_code)]

use std::ops::Range;

use byteorder::{BigEndian, WriteBytesExt};
use hfsplus_btree::{
    BlockDevice, Error, ExtentDescriptor, Fork, ForkData, NodeDescriptor, Result, kBTHeaderNode, kHFSPlusAttrExtents,
    kHFSPlusAttrForkData, kHFSPlusAttrInlineData, kHFSPlusFileRecord, kHFSPlusFolderRecord,
};

pub const NODE_SIZE: usize = 1024;
pub const BLOCK_SIZE: u32 = 512;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A volume image whose reads fail when they touch `bad` bytes.
pub struct FailingDevice {
    pub image: Vec<u8>,
    pub bad: Range<u64>,
}

impl BlockDevice for FailingDevice {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let end = offset + dest.len() as u64;
        if offset < self.bad.end && self.bad.start < end {
            return Err(Error::Io(format!("unreadable sector at {offset}")));
        }
        self.image.read_at(offset, dest)
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    let units: Vec<u16> = name.encode_utf16().collect();
    out.write_u16::<BigEndian>(units.len() as u16).unwrap();
    for unit in units {
        out.write_u16::<BigEndian>(unit).unwrap();
    }
}

pub fn catalog_key(parent: u32, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(6 + 2 * name.encode_utf16().count() as u16)
        .unwrap();
    out.write_u32::<BigEndian>(parent).unwrap();
    write_name(&mut out, name);
    out
}

pub fn attribute_key(file_id: u32, name: &str, start_block: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(12 + 2 * name.encode_utf16().count() as u16)
        .unwrap();
    out.write_u16::<BigEndian>(0).unwrap();
    out.write_u32::<BigEndian>(file_id).unwrap();
    out.write_u32::<BigEndian>(start_block).unwrap();
    write_name(&mut out, name);
    out
}

pub fn leaf_record(key: Vec<u8>, payload: &[u8]) -> Vec<u8> {
    let mut record = key;
    record.extend_from_slice(payload);
    record
}

pub fn index_record(key: Vec<u8>, child: u32) -> Vec<u8> {
    let mut record = key;
    record.write_u32::<BigEndian>(child).unwrap();
    record
}

/// A node with `records` laid out after the descriptor and the offset table
/// written at the tail.
pub fn node(kind: i8, height: u8, links: (u32, u32), records: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::with_capacity(NODE_SIZE);
    data.write_u32::<BigEndian>(links.0).unwrap();
    data.write_u32::<BigEndian>(links.1).unwrap();
    data.write_i8(kind).unwrap();
    data.write_u8(height).unwrap();
    data.write_u16::<BigEndian>(records.len() as u16).unwrap();
    data.write_u16::<BigEndian>(0).unwrap();

    let mut offsets = Vec::with_capacity(records.len() + 1);
    for record in records {
        offsets.push(data.len() as u16);
        data.extend_from_slice(record);
    }
    offsets.push(data.len() as u16);
    assert!(
        data.len() + 2 * offsets.len() <= NODE_SIZE,
        "records do not fit in one node"
    );

    data.resize(NODE_SIZE - 2 * offsets.len(), 0);
    for offset in offsets.iter().rev() {
        data.write_u16::<BigEndian>(*offset).unwrap();
    }
    data
}

pub struct Header {
    pub depth: u16,
    pub root: u32,
    pub leaf_records: u32,
    pub first_leaf: u32,
    pub last_leaf: u32,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub key_compare_type: u8,
    pub attributes: u32,
}

/// Node 0: descriptor, header record, user data record and map record.
pub fn header_node(header: &Header) -> Vec<u8> {
    let mut data = Vec::with_capacity(NODE_SIZE);
    data.write_u32::<BigEndian>(0).unwrap();
    data.write_u32::<BigEndian>(0).unwrap();
    data.write_i8(kBTHeaderNode).unwrap();
    data.write_u8(0).unwrap();
    data.write_u16::<BigEndian>(3).unwrap();
    data.write_u16::<BigEndian>(0).unwrap();

    data.write_u16::<BigEndian>(header.depth).unwrap();
    data.write_u32::<BigEndian>(header.root).unwrap();
    data.write_u32::<BigEndian>(header.leaf_records).unwrap();
    data.write_u32::<BigEndian>(header.first_leaf).unwrap();
    data.write_u32::<BigEndian>(header.last_leaf).unwrap();
    data.write_u16::<BigEndian>(NODE_SIZE as u16).unwrap();
    data.write_u16::<BigEndian>(header.max_key_length).unwrap();
    data.write_u32::<BigEndian>(header.total_nodes).unwrap();
    data.write_u32::<BigEndian>(0).unwrap(); // free nodes
    data.write_u16::<BigEndian>(0).unwrap();
    data.write_u32::<BigEndian>(NODE_SIZE as u32).unwrap(); // clump size
    data.write_u8(0).unwrap(); // btree type
    data.write_u8(header.key_compare_type).unwrap();
    data.write_u32::<BigEndian>(header.attributes).unwrap();
    data.resize(NodeDescriptor::SIZE + 106, 0);

    let map_start = NodeDescriptor::SIZE + 106 + 128;
    let free_start = NODE_SIZE - 8;
    data.resize(free_start, 0);
    for offset in [free_start, map_start, NodeDescriptor::SIZE + 106, NodeDescriptor::SIZE] {
        data.write_u16::<BigEndian>(offset as u16).unwrap();
    }
    data
}

/// Writes a fork's logical `contents` into `volume` along `extents` (in
/// allocation blocks) and returns the fork describing them.
pub fn place(volume: &mut Vec<u8>, contents: &[u8], extents: &[(u32, u32)]) -> Fork {
    let block = BLOCK_SIZE as usize;
    let mut data = ForkData {
        logical_size: contents.len() as u64,
        ..ForkData::default()
    };
    let mut written = 0;
    for (slot, &(start_block, block_count)) in extents.iter().enumerate() {
        data.extents[slot] = ExtentDescriptor {
            start_block,
            block_count,
        };
        data.total_blocks += block_count;
        let start = start_block as usize * block;
        let len = block_count as usize * block;
        if volume.len() < start + len {
            volume.resize(start + len, 0);
        }
        let count = len.min(contents.len() - written);
        volume[start..start + count].copy_from_slice(&contents[written..written + count]);
        written += count;
    }
    assert_eq!(written, contents.len(), "extents too small for the fork");
    Fork::new(data, BLOCK_SIZE)
}

fn dates(out: &mut Vec<u8>) {
    for date in [0xC000_0000u32, 0xC000_0100, 0xC000_0200, 0xC000_0300, 0] {
        out.write_u32::<BigEndian>(date).unwrap();
    }
}

fn bsd_info(out: &mut Vec<u8>, mode: u16, special: u32) {
    out.write_u32::<BigEndian>(501).unwrap();
    out.write_u32::<BigEndian>(20).unwrap();
    out.write_u8(0).unwrap();
    out.write_u8(0).unwrap();
    out.write_u16::<BigEndian>(mode).unwrap();
    out.write_u32::<BigEndian>(special).unwrap();
}

pub fn folder(folder_id: u32, valence: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_i16::<BigEndian>(kHFSPlusFolderRecord).unwrap();
    out.write_u16::<BigEndian>(0x0002).unwrap();
    out.write_u32::<BigEndian>(valence).unwrap();
    out.write_u32::<BigEndian>(folder_id).unwrap();
    dates(&mut out);
    bsd_info(&mut out, 0o040755, 0);
    out.extend_from_slice(&[0; 16 + 16]);
    out.write_u32::<BigEndian>(0).unwrap(); // text encoding
    out.write_u32::<BigEndian>(0).unwrap();
    assert_eq!(out.len(), 88);
    out
}

pub fn file(file_id: u32, type_creator: (&[u8; 4], &[u8; 4]), special: u32, size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_i16::<BigEndian>(kHFSPlusFileRecord).unwrap();
    out.write_u16::<BigEndian>(0x0002).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    out.write_u32::<BigEndian>(file_id).unwrap();
    dates(&mut out);
    bsd_info(&mut out, 0o100644, special);
    out.extend_from_slice(type_creator.0);
    out.extend_from_slice(type_creator.1);
    out.extend_from_slice(&[0; 8 + 16]);
    out.write_u32::<BigEndian>(0).unwrap(); // text encoding
    out.write_u32::<BigEndian>(0).unwrap();
    // data fork: one extent sized to fit
    out.write_u64::<BigEndian>(size).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    let blocks = size.div_ceil(BLOCK_SIZE as u64) as u32;
    out.write_u32::<BigEndian>(blocks).unwrap();
    out.write_u32::<BigEndian>(500).unwrap();
    out.write_u32::<BigEndian>(blocks).unwrap();
    out.extend_from_slice(&[0; 56]);
    out.extend_from_slice(&[0; 80]); // resource fork
    assert_eq!(out.len(), 248);
    out
}

pub fn thread(kind: i16, parent: u32, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_i16::<BigEndian>(kind).unwrap();
    out.write_i16::<BigEndian>(0).unwrap();
    out.write_u32::<BigEndian>(parent).unwrap();
    write_name(&mut out, name);
    out
}

pub fn inline_attribute(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(kHFSPlusAttrInlineData).unwrap();
    out.extend_from_slice(&[0; 8]);
    out.write_u32::<BigEndian>(value.len() as u32).unwrap();
    out.extend_from_slice(value);
    if out.len() % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn fork_attribute(fork: &Fork) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(kHFSPlusAttrForkData).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    out.write_u64::<BigEndian>(fork.data.logical_size).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    out.write_u32::<BigEndian>(fork.data.total_blocks).unwrap();
    for extent in fork.data.extents {
        out.write_u32::<BigEndian>(extent.start_block).unwrap();
        out.write_u32::<BigEndian>(extent.block_count).unwrap();
    }
    out
}

pub fn extents_attribute(extents: &[(u32, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(kHFSPlusAttrExtents).unwrap();
    out.write_u32::<BigEndian>(0).unwrap();
    for slot in 0..8 {
        let (start, count) = extents.get(slot).copied().unwrap_or_default();
        out.write_u32::<BigEndian>(start).unwrap();
        out.write_u32::<BigEndian>(count).unwrap();
    }
    out
}
