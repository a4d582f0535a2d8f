//! The catalog B-tree: folders, files and the thread records linking a
//! node id back to its parent and name.

use alloc::format;
use alloc::vec::Vec;
use core::ops::ControlFlow;

use crate::btree::BTree;
use crate::bytes::ByteReader;
use crate::device::BlockDevice;
use crate::fork::Fork;
use crate::internal::*;
use crate::key::{CatalogKey, HfsName, Key};
use crate::node::LeafRecord;
use crate::{Error, Result};

const HARD_LINK_FILE_TYPE: u32 = u32::from_be_bytes(*b"hlnk");
const HFS_PLUS_CREATOR: u32 = u32::from_be_bytes(*b"hfs+");
const DIRECTORY_ALIAS_TYPE: u32 = u32::from_be_bytes(*b"fdrp");
const DIRECTORY_ALIAS_CREATOR: u32 = u32::from_be_bytes(*b"MACS");

/// Root-level folder holding the inodes of file hard links.
pub const FILE_LINK_FOLDER: &str = "\0\0\0\0HFS+ Private Data";
/// Root-level folder holding the targets of directory hard links.
pub const DIRECTORY_LINK_FOLDER: &str = ".HFS+ Private Directory Data\r";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CatalogFolder {
    pub flags: u16,
    /// Number of direct children.
    pub valence: u32,
    pub folder_id: CatalogNodeId,
    pub create_date: u32,
    pub content_mod_date: u32,
    pub attribute_mod_date: u32,
    pub access_date: u32,
    pub backup_date: u32,
    pub permissions: BsdInfo,
    pub user_info: FolderInfo,
    pub finder_info: ExtendedFolderInfo,
    pub text_encoding: u32,
    /// Number of child folders, valid with `CatalogFlags::HAS_FOLDER_COUNT`.
    pub folder_count: u32,
}

impl CatalogFolder {
    pub const SIZE: usize = 86;

    fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            flags: source.read_u16_be()?,
            valence: source.read_u32_be()?,
            folder_id: source.read_u32_be()?,
            create_date: source.read_u32_be()?,
            content_mod_date: source.read_u32_be()?,
            attribute_mod_date: source.read_u32_be()?,
            access_date: source.read_u32_be()?,
            backup_date: source.read_u32_be()?,
            permissions: BsdInfo::parse(source)?,
            user_info: FolderInfo::parse(source)?,
            finder_info: ExtendedFolderInfo::parse(source)?,
            text_encoding: source.read_u32_be()?,
            folder_count: source.read_u32_be()?,
        })
    }

    pub fn flags(&self) -> CatalogFlags {
        CatalogFlags::from_bits_retain(self.flags)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CatalogFile {
    pub flags: u16,
    pub reserved1: u32,
    pub file_id: CatalogNodeId,
    pub create_date: u32,
    pub content_mod_date: u32,
    pub attribute_mod_date: u32,
    pub access_date: u32,
    pub backup_date: u32,
    pub permissions: BsdInfo,
    pub user_info: FileInfo,
    pub finder_info: ExtendedFileInfo,
    pub text_encoding: u32,
    pub reserved2: u32,
    pub data_fork: ForkData,
    pub resource_fork: ForkData,
}

impl CatalogFile {
    pub const SIZE: usize = 246;

    fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            flags: source.read_u16_be()?,
            reserved1: source.read_u32_be()?,
            file_id: source.read_u32_be()?,
            create_date: source.read_u32_be()?,
            content_mod_date: source.read_u32_be()?,
            attribute_mod_date: source.read_u32_be()?,
            access_date: source.read_u32_be()?,
            backup_date: source.read_u32_be()?,
            permissions: BsdInfo::parse(source)?,
            user_info: FileInfo::parse(source)?,
            finder_info: ExtendedFileInfo::parse(source)?,
            text_encoding: source.read_u32_be()?,
            reserved2: source.read_u32_be()?,
            data_fork: ForkData::parse(source)?,
            resource_fork: ForkData::parse(source)?,
        })
    }

    pub fn flags(&self) -> CatalogFlags {
        CatalogFlags::from_bits_retain(self.flags)
    }

    /// Classifies the record as a hard link by its Finder type and creator.
    /// The link's inode number lives in the BSD `special` field.
    pub fn hard_link(&self) -> Option<HardLink> {
        let inode = self.permissions.special;
        match (self.user_info.file_type, self.user_info.file_creator) {
            (HARD_LINK_FILE_TYPE, HFS_PLUS_CREATOR) => Some(HardLink::File { inode }),
            (DIRECTORY_ALIAS_TYPE, DIRECTORY_ALIAS_CREATOR) => Some(HardLink::Directory { inode }),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HardLink {
    File { inode: u32 },
    Directory { inode: u32 },
}

impl HardLink {
    /// Name of the root-level folder that holds the link target.
    pub fn private_folder(&self) -> HfsName {
        match self {
            HardLink::File { .. } => HfsName::from_str_verbatim(FILE_LINK_FOLDER),
            HardLink::Directory { .. } => HfsName::from_str_verbatim(DIRECTORY_LINK_FOLDER),
        }
    }

    /// Name of the link target inside its private folder.
    pub fn target_name(&self) -> HfsName {
        match self {
            HardLink::File { inode } => HfsName::from_str_verbatim(&format!("iNode{inode}")),
            HardLink::Directory { inode } => HfsName::from_str_verbatim(&format!("dir_{inode}")),
        }
    }
}

/// Body of a thread record: where the node id it is keyed by lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogThread {
    pub parent_id: CatalogNodeId,
    pub node_name: HfsName,
}

impl CatalogThread {
    fn parse(source: &mut ByteReader<'_>) -> Result<Self> {
        let _reserved = source.read_i16_be()?;
        Ok(Self {
            parent_id: source.read_u32_be()?,
            node_name: HfsName::parse(source, HfsName::MAX_LEN)?,
        })
    }

    /// Key of the folder or file record this thread points at.
    pub fn target_key(&self) -> CatalogKey {
        CatalogKey::new(self.parent_id, self.node_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogBody {
    Folder(CatalogFolder),
    File(CatalogFile),
    FolderThread(CatalogThread),
    FileThread(CatalogThread),
}

impl CatalogBody {
    /// Decodes a leaf payload. Unrecognized record types are reported as
    /// [`Error::UnknownRecordType`].
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut source = ByteReader::new(payload);
        let record_type = source.read_i16_be()?;
        Ok(match record_type {
            kHFSPlusFolderRecord => CatalogBody::Folder(CatalogFolder::parse(&mut source)?),
            kHFSPlusFileRecord => CatalogBody::File(CatalogFile::parse(&mut source)?),
            kHFSPlusFolderThreadRecord => {
                CatalogBody::FolderThread(CatalogThread::parse(&mut source)?)
            }
            kHFSPlusFileThreadRecord => CatalogBody::FileThread(CatalogThread::parse(&mut source)?),
            other => return Err(Error::UnknownRecordType(other as u16 as u32)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub key: CatalogKey,
    pub body: CatalogBody,
}

impl CatalogRecord {
    pub fn from_leaf(record: LeafRecord<CatalogKey>) -> Result<Self> {
        Ok(CatalogRecord {
            body: CatalogBody::parse(&record.payload)?,
            key: record.key,
        })
    }

    pub fn name(&self) -> &HfsName {
        &self.key.node_name
    }

    /// Node id of a folder or file record. Threads have none of their own.
    pub fn id(&self) -> Option<CatalogNodeId> {
        match &self.body {
            CatalogBody::Folder(f) => Some(f.folder_id),
            CatalogBody::File(f) => Some(f.file_id),
            CatalogBody::FolderThread(_) | CatalogBody::FileThread(_) => None,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.body, CatalogBody::Folder(_))
    }

    pub fn is_thread(&self) -> bool {
        matches!(
            self.body,
            CatalogBody::FolderThread(_) | CatalogBody::FileThread(_)
        )
    }
}

/// Decodes a record for a bulk query; undecodable payloads are skipped.
fn decode_lenient(record: LeafRecord<CatalogKey>) -> Option<CatalogRecord> {
    let key = record.key.clone();
    match CatalogRecord::from_leaf(record) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(key = ?key, error = %e, "skipping catalog record");
            None
        }
    }
}

/// Decodes a record for a point query. Only an unknown record type counts as
/// absent; truncated payloads are errors.
fn decode_strict(record: LeafRecord<CatalogKey>) -> Result<Option<CatalogRecord>> {
    let key = record.key.clone();
    match CatalogRecord::from_leaf(record) {
        Ok(record) => Ok(Some(record)),
        Err(Error::UnknownRecordType(kind)) => {
            tracing::warn!(key = ?key, kind, "unknown catalog record type");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// The catalog file of a mounted volume.
///
/// Every query is a fresh descent from the root node; the only state kept
/// between calls is the tree's header record.
pub struct Catalog<'d, D: BlockDevice + ?Sized> {
    btree: BTree<'d, D, CatalogKey>,
}

impl<'d, D: BlockDevice + ?Sized> Catalog<'d, D> {
    pub fn new(device: &'d D, fork: Fork) -> Result<Self> {
        Ok(Catalog {
            btree: BTree::open(device, fork)?,
        })
    }

    pub fn btree(&self) -> &BTree<'d, D, CatalogKey> {
        &self.btree
    }

    pub fn key_compare(&self) -> Option<KeyCompareType> {
        self.btree.header().map(HeaderRecord::key_compare)
    }

    /// The first decodable record keyed under `parent_id`. For a folder with a
    /// thread record that is the thread.
    pub fn get_record(&self, parent_id: CatalogNodeId) -> Result<Option<CatalogRecord>> {
        let found = self
            .btree
            .scan(&CatalogKey::first_of(parent_id), |record| {
                if record.key.parent_id != parent_id {
                    return ControlFlow::Break(None);
                }
                match decode_lenient(record) {
                    Some(record) => ControlFlow::Break(Some(record)),
                    None => ControlFlow::Continue(()),
                }
            })?;
        Ok(found.flatten())
    }

    /// Every decodable record keyed under `parent_id`, in name order: the
    /// folder's thread record (if any) followed by its children.
    pub fn get_records(&self, parent_id: CatalogNodeId) -> Result<Vec<CatalogRecord>> {
        let records = self.btree.get_records_with_id(parent_id)?;
        Ok(records.into_iter().filter_map(decode_lenient).collect())
    }

    /// The record named `name` inside `parent_id`.
    pub fn get_record_named(
        &self,
        parent_id: CatalogNodeId,
        name: &HfsName,
    ) -> Result<Option<CatalogRecord>> {
        if name.len() > HfsName::MAX_LEN {
            return Ok(None);
        }
        let key = CatalogKey::new(parent_id, name.clone());
        match self.btree.get_record(&key)? {
            Some(record) => decode_strict(record),
            None => Ok(None),
        }
    }

    /// The folder or file record with node id `id`, found through its thread.
    pub fn get_by_id(&self, id: CatalogNodeId) -> Result<Option<CatalogRecord>> {
        let Some(thread) = self.btree.get_record(&CatalogKey::first_of(id))? else {
            return Ok(None);
        };
        let thread = match decode_strict(thread)? {
            Some(CatalogRecord {
                body: CatalogBody::FolderThread(t) | CatalogBody::FileThread(t),
                ..
            }) => t,
            Some(other) => {
                tracing::warn!(id, key = ?other.key, "expected a thread record");
                return Ok(None);
            }
            None => return Ok(None),
        };
        self.get_record_named(thread.parent_id, &thread.node_name)
    }

    /// The inode record a hard link points at, or `None` for an ordinary file
    /// or a link whose target is missing.
    pub fn resolve_hard_link(&self, file: &CatalogFile) -> Result<Option<CatalogRecord>> {
        let Some(link) = file.hard_link() else {
            return Ok(None);
        };
        let folder = self.get_record_named(kHFSRootFolderID, &link.private_folder())?;
        let Some(CatalogRecord {
            body: CatalogBody::Folder(folder),
            ..
        }) = folder
        else {
            tracing::debug!(?link, "hard link private folder missing");
            return Ok(None);
        };
        self.get_record_named(folder.folder_id, &link.target_name())
    }
}
