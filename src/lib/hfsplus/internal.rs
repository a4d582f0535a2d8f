//! Fixed-layout on-disk structures shared by every B-tree and record type.

#![allow(non_upper_case_globals)]

use bitflags::bitflags;

use crate::bytes::ByteReader;
use crate::{Error, Result};

pub type CatalogNodeId = u32;

pub const kHFSRootParentID: CatalogNodeId = 1;
pub const kHFSRootFolderID: CatalogNodeId = 2;
pub const kHFSExtentsFileID: CatalogNodeId = 3;
pub const kHFSCatalogFileID: CatalogNodeId = 4;
pub const kHFSBadBlockFileID: CatalogNodeId = 5;
pub const kHFSAllocationFileID: CatalogNodeId = 6;
pub const kHFSStartupFileID: CatalogNodeId = 7;
pub const kHFSAttributesFileID: CatalogNodeId = 8;
pub const kHFSFirstUserCatalogNodeID: CatalogNodeId = 16;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ExtentDescriptor {
    pub start_block: u32,
    pub block_count: u32,
}

impl ExtentDescriptor {
    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            start_block: source.read_u32_be()?,
            block_count: source.read_u32_be()?,
        })
    }
}

pub type ExtentRecord = [ExtentDescriptor; 8];

pub(crate) fn parse_extent_record(source: &mut ByteReader<'_>) -> Result<ExtentRecord> {
    let mut record = [ExtentDescriptor::default(); 8];
    for extent in &mut record {
        *extent = ExtentDescriptor::parse(source)?;
    }
    Ok(record)
}

/// A fork descriptor: logical size plus the first eight extents.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ForkData {
    pub logical_size: u64,
    pub clump_size: u32,
    pub total_blocks: u32,
    pub extents: ExtentRecord,
}

impl ForkData {
    pub const SIZE: usize = 80;

    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            logical_size: source.read_u64_be()?,
            clump_size: source.read_u32_be()?,
            total_blocks: source.read_u32_be()?,
            extents: parse_extent_record(source)?,
        })
    }

    /// Decodes an 80 byte fork descriptor, e.g. one copied out of a volume header.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(&mut ByteReader::new(data))
    }

    /// Extents in use, in logical order. A zero block count ends the list.
    pub fn used_extents(&self) -> impl Iterator<Item = &ExtentDescriptor> {
        self.extents.iter().take_while(|e| e.block_count != 0)
    }
}

pub const kHFSPlusFolderRecord: i16 = 0x0001;
pub const kHFSPlusFileRecord: i16 = 0x0002;
pub const kHFSPlusFolderThreadRecord: i16 = 0x0003;
pub const kHFSPlusFileThreadRecord: i16 = 0x0004;

pub const kHFSPlusAttrInlineData: u32 = 0x10;
pub const kHFSPlusAttrForkData: u32 = 0x20;
pub const kHFSPlusAttrExtents: u32 = 0x30;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Index,
    Header,
    Map,
}

pub const kBTLeafNode: i8 = -1;
pub const kBTIndexNode: i8 = 0;
pub const kBTHeaderNode: i8 = 1;
pub const kBTMapNode: i8 = 2;

impl NodeKind {
    pub fn from_raw(kind: i8) -> Option<Self> {
        match kind {
            kBTLeafNode => Some(NodeKind::Leaf),
            kBTIndexNode => Some(NodeKind::Index),
            kBTHeaderNode => Some(NodeKind::Header),
            kBTMapNode => Some(NodeKind::Map),
            _ => None,
        }
    }
}

/// The descriptor at the start of every node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub forward_link: u32,
    pub backward_link: u32,
    pub kind: i8,
    pub height: u8,
    pub num_records: u16,
    pub reserved: u16,
}

impl NodeDescriptor {
    pub const SIZE: usize = 14;

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut source = ByteReader::new(data);
        Ok(Self {
            forward_link: source.read_u32_be()?,
            backward_link: source.read_u32_be()?,
            kind: source.read_i8()?,
            height: source.read_u8()?,
            num_records: source.read_u16_be()?,
            reserved: source.read_u16_be()?,
        })
    }

    pub fn node_kind(&self) -> Option<NodeKind> {
        NodeKind::from_raw(self.kind)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BTreeAttributes: u32 {
        const BAD_CLOSE = 0x0000_0001;
        const BIG_KEYS = 0x0000_0002;
        const VARIABLE_INDEX_KEYS = 0x0000_0004;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyCompareType {
    CaseFolding,
    Binary,
    Other(u8),
}

pub const kHFSCaseFolding: u8 = 0xCF;
pub const kHFSBinaryCompare: u8 = 0xBC;

/// The B-tree header record, stored right after the descriptor of node 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub tree_depth: u16,
    pub root_node: u32,
    pub leaf_records: u32,
    pub first_leaf_node: u32,
    pub last_leaf_node: u32,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub reserved1: u16,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: u32,
}

impl HeaderRecord {
    pub const SIZE: usize = 106;

    /// Decodes the header record found at `NodeDescriptor::SIZE` in `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut source = ByteReader::at(data, NodeDescriptor::SIZE)?;
        let header = Self {
            tree_depth: source.read_u16_be()?,
            root_node: source.read_u32_be()?,
            leaf_records: source.read_u32_be()?,
            first_leaf_node: source.read_u32_be()?,
            last_leaf_node: source.read_u32_be()?,
            node_size: source.read_u16_be()?,
            max_key_length: source.read_u16_be()?,
            total_nodes: source.read_u32_be()?,
            free_nodes: source.read_u32_be()?,
            reserved1: source.read_u16_be()?,
            clump_size: source.read_u32_be()?,
            btree_type: source.read_u8()?,
            key_compare_type: source.read_u8()?,
            attributes: source.read_u32_be()?,
        };
        source.skip(16 * 4)?;
        Ok(header)
    }

    pub fn attributes(&self) -> BTreeAttributes {
        BTreeAttributes::from_bits_truncate(self.attributes)
    }

    pub fn key_compare(&self) -> KeyCompareType {
        match self.key_compare_type {
            kHFSCaseFolding => KeyCompareType::CaseFolding,
            kHFSBinaryCompare => KeyCompareType::Binary,
            other => KeyCompareType::Other(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root_node == 0
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let size = self.node_size;
        if !size.is_power_of_two() || size < 512 {
            return Err(Error::corrupt(0, "node size is not a power of two >= 512"));
        }
        Ok(())
    }
}

bitflags! {
    /// Flags word of folder and file records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CatalogFlags: u16 {
        const LOCKED = 0x0001;
        const THREAD_EXISTS = 0x0002;
        const HAS_ATTRIBUTES = 0x0004;
        const HAS_SECURITY = 0x0008;
        const HAS_FOLDER_COUNT = 0x0010;
        const HAS_LINK_CHAIN = 0x0020;
        const HAS_CHILD_LINK = 0x0040;
        const HAS_DATE_ADDED = 0x0080;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileMode: u16 {
        const S_ISUID = 0o0004000;
        const S_ISGID = 0o0002000;
        const S_ISTXT = 0o0001000;

        const S_IRWXU = 0o0000700;
        const S_IRUSR = 0o0000400;
        const S_IWUSR = 0o0000200;
        const S_IXUSR = 0o0000100;

        const S_IRWXG = 0o0000070;
        const S_IRGRP = 0o0000040;
        const S_IWGRP = 0o0000020;
        const S_IXGRP = 0o0000010;

        const S_IRWXO = 0o0000007;
        const S_IROTH = 0o0000004;
        const S_IWOTH = 0o0000002;
        const S_IXOTH = 0o0000001;

        const S_IFMT = 0o0170000;
        const S_IFIFO = 0o0010000;
        const S_IFCHR = 0o0020000;
        const S_IFDIR = 0o0040000;
        const S_IFBLK = 0o0060000;
        const S_IFREG = 0o0100000;
        const S_IFLNK = 0o0120000;
        const S_IFSOCK = 0o0140000;
        const S_IFWHT = 0o0160000;
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BsdInfo {
    pub owner_id: u32,
    pub group_id: u32,
    pub admin_flags: u8,
    pub owner_flags: u8,
    pub file_mode: u16,
    /// Inode number, link count or raw device, depending on the record.
    pub special: u32,
}

impl BsdInfo {
    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            owner_id: source.read_u32_be()?,
            group_id: source.read_u32_be()?,
            admin_flags: source.read_u8()?,
            owner_flags: source.read_u8()?,
            file_mode: source.read_u16_be()?,
            special: source.read_u32_be()?,
        })
    }

    pub fn mode(&self) -> FileMode {
        FileMode::from_bits_retain(self.file_mode)
    }

    pub fn file_type(&self) -> FileMode {
        self.mode() & FileMode::S_IFMT
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Point {
    pub v: i16,
    pub h: i16,
}

impl Point {
    fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            v: source.read_i16_be()?,
            h: source.read_i16_be()?,
        })
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Rect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}

impl Rect {
    fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            top: source.read_i16_be()?,
            left: source.read_i16_be()?,
            bottom: source.read_i16_be()?,
            right: source.read_i16_be()?,
        })
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub file_type: u32,
    pub file_creator: u32,
    pub finder_flags: u16,
    pub location: Point,
    pub reserved_field: u16,
}

impl FileInfo {
    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            file_type: source.read_u32_be()?,
            file_creator: source.read_u32_be()?,
            finder_flags: source.read_u16_be()?,
            location: Point::parse(source)?,
            reserved_field: source.read_u16_be()?,
        })
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ExtendedFileInfo {
    pub reserved1: [i16; 4],
    pub extended_finder_flags: u16,
    pub reserved2: i16,
    pub put_away_folder_id: i32,
}

impl ExtendedFileInfo {
    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            reserved1: [
                source.read_i16_be()?,
                source.read_i16_be()?,
                source.read_i16_be()?,
                source.read_i16_be()?,
            ],
            extended_finder_flags: source.read_u16_be()?,
            reserved2: source.read_i16_be()?,
            put_away_folder_id: source.read_i32_be()?,
        })
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FolderInfo {
    pub window_bounds: Rect,
    pub finder_flags: u16,
    pub location: Point,
    pub reserved_field: u16,
}

impl FolderInfo {
    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            window_bounds: Rect::parse(source)?,
            finder_flags: source.read_u16_be()?,
            location: Point::parse(source)?,
            reserved_field: source.read_u16_be()?,
        })
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ExtendedFolderInfo {
    pub scroll_position: Point,
    pub reserved1: i32,
    pub extended_finder_flags: u16,
    pub reserved2: i16,
    pub put_away_folder_id: i32,
}

impl ExtendedFolderInfo {
    pub(crate) fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            scroll_position: Point::parse(source)?,
            reserved1: source.read_i32_be()?,
            extended_finder_flags: source.read_u16_be()?,
            reserved2: source.read_i16_be()?,
            put_away_folder_id: source.read_i32_be()?,
        })
    }
}
