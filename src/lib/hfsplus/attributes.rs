//! The attributes B-tree: named extended attributes keyed by file id.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::ControlFlow;

use crate::btree::BTree;
use crate::bytes::ByteReader;
use crate::device::BlockDevice;
use crate::fork::Fork;
use crate::internal::*;
use crate::key::{AttributeKey, HfsName, Key};
use crate::node::LeafRecord;
use crate::{Error, Result};

/// Where an attribute's value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeData {
    /// Stored in the leaf record itself.
    Inline { size: u64, bytes: Vec<u8> },
    /// Stored in a fork of its own, described by the record.
    ForkReference { file_id: CatalogNodeId, fork: Fork },
    /// Extents past the first eight of a fork attribute. Reading these needs
    /// the extents overflow file and is not supported.
    ExtentsReference {
        file_id: CatalogNodeId,
        extents: ExtentRecord,
    },
}

impl AttributeData {
    /// Decodes a leaf payload owned by `file_id`. `block_size` is the volume's
    /// allocation block size, used for fork references.
    pub fn parse(file_id: CatalogNodeId, payload: &[u8], block_size: u32) -> Result<Self> {
        let mut source = ByteReader::new(payload);
        let record_type = source.read_u32_be()?;
        match record_type {
            kHFSPlusAttrInlineData => {
                source.skip(8)?; // reserved
                let size = source.read_u32_be()?;
                let bytes = source.take(size as usize)?.to_vec();
                Ok(AttributeData::Inline {
                    size: size as u64,
                    bytes,
                })
            }
            kHFSPlusAttrForkData => {
                source.skip(4)?;
                let data = ForkData::parse(&mut source)?;
                Ok(AttributeData::ForkReference {
                    file_id,
                    fork: Fork::new(data, block_size),
                })
            }
            kHFSPlusAttrExtents => {
                source.skip(4)?;
                Ok(AttributeData::ExtentsReference {
                    file_id,
                    extents: parse_extent_record(&mut source)?,
                })
            }
            other => Err(Error::UnknownRecordType(other)),
        }
    }

    /// Logical size of the value in bytes. Unknown for extent continuations.
    pub fn size(&self) -> Option<u64> {
        match self {
            AttributeData::Inline { size, .. } => Some(*size),
            AttributeData::ForkReference { fork, .. } => Some(fork.len()),
            AttributeData::ExtentsReference { .. } => None,
        }
    }

    /// Fills `dest` with the value's bytes starting at `offset`.
    pub fn read<D: BlockDevice + ?Sized>(
        &self,
        device: &D,
        offset: u64,
        dest: &mut [u8],
    ) -> Result<()> {
        match self {
            AttributeData::Inline { bytes, .. } => {
                let range = usize::try_from(offset)
                    .ok()
                    .and_then(|start| Some(start..start.checked_add(dest.len())?))
                    .filter(|range| range.end <= bytes.len())
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "read of {} bytes at {offset} outside {} byte attribute",
                            dest.len(),
                            bytes.len()
                        ))
                    })?;
                dest.copy_from_slice(&bytes[range]);
                Ok(())
            }
            AttributeData::ForkReference { fork, .. } => fork.read(device, offset, dest),
            AttributeData::ExtentsReference { .. } => Err(Error::NotImplemented(
                "attribute data in extents overflow records",
            )),
        }
    }
}

/// The attributes file of a mounted volume.
///
/// Volumes without extended attributes often have an attributes file with no
/// extents; queries against it return empty results.
pub struct Attributes<'d, D: BlockDevice + ?Sized> {
    btree: BTree<'d, D, AttributeKey>,
}

impl<'d, D: BlockDevice + ?Sized> Attributes<'d, D> {
    pub fn new(device: &'d D, fork: Fork) -> Result<Self> {
        Ok(Attributes {
            btree: BTree::open(device, fork)?,
        })
    }

    pub fn btree(&self) -> &BTree<'d, D, AttributeKey> {
        &self.btree
    }

    /// Names of the attributes `file_id` carries, in key order.
    pub fn get_all_attributes(&self, file_id: CatalogNodeId) -> Result<Vec<String>> {
        let mut names: Vec<HfsName> = Vec::new();
        for record in self.btree.get_records_with_id(file_id)? {
            let record_type = ByteReader::new(&record.payload).read_u32_be();
            match record_type {
                Ok(kHFSPlusAttrInlineData | kHFSPlusAttrForkData | kHFSPlusAttrExtents) => {}
                Ok(other) => {
                    tracing::warn!(key = ?record.key, kind = other, "skipping attribute record");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(key = ?record.key, error = %e, "skipping attribute record");
                    continue;
                }
            }
            // extent continuation records repeat the name
            if names.last() != Some(&record.key.attribute_name) {
                names.push(record.key.attribute_name);
            }
        }
        Ok(names.iter().map(HfsName::to_string_lossy).collect())
    }

    /// The value of attribute `name` on `file_id`.
    pub fn get_attribute(
        &self,
        file_id: CatalogNodeId,
        name: &str,
    ) -> Result<Option<AttributeData>> {
        let name = HfsName::from_str_verbatim(name);
        if name.len() > AttributeKey::MAX_NAME_LEN {
            return Ok(None);
        }
        let mut matches: Vec<LeafRecord<AttributeKey>> = Vec::new();
        self.btree
            .scan(&AttributeKey::new(file_id, name.clone()), |record| {
                if record.key.primary_id() != file_id || record.key.attribute_name != name {
                    return ControlFlow::Break(());
                }
                matches.push(record);
                ControlFlow::Continue(())
            })?;

        if matches.len() > 1 {
            tracing::warn!(
                file_id,
                name = %name,
                count = matches.len(),
                "more than one record for attribute, using the first"
            );
        }
        match matches.first() {
            Some(record) => self.to_attribute_data(file_id, record),
            None => Ok(None),
        }
    }

    /// Decodes a leaf record of this tree. Unknown record types are logged and
    /// reported as `None`; extents overflow records fail with
    /// [`Error::NotImplemented`].
    pub fn to_attribute_data(
        &self,
        file_id: CatalogNodeId,
        record: &LeafRecord<AttributeKey>,
    ) -> Result<Option<AttributeData>> {
        match AttributeData::parse(file_id, &record.payload, self.btree.fork().block_size) {
            Ok(AttributeData::ExtentsReference { .. }) => Err(Error::NotImplemented(
                "attribute data in extents overflow records",
            )),
            Ok(data) => Ok(Some(data)),
            Err(Error::UnknownRecordType(kind)) => {
                tracing::warn!(key = ?record.key, kind, "unknown attribute record type");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
