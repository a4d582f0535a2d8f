//! Self-describing B-tree keys.
//!
//! Every key starts with a `u16` length that counts the bytes after it, so a
//! record's key can be skipped without knowing its variant. Names compare
//! ordinally by UTF-16 code unit. That is exact for binary-compare (HFSX)
//! catalogs and for the attributes file, and an approximation of the
//! case-folding order used by plain HFS+ catalogs.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use unicode_normalization::UnicodeNormalization;

use crate::bytes::ByteReader;
use crate::internal::CatalogNodeId;
use crate::{Error, Result};

/// A key variant stored in a B-tree.
pub trait Key: fmt::Debug + Clone + Ord {
    /// Decodes a key from the start of `record`.
    fn parse(record: &[u8]) -> Result<Self>;

    /// Bytes the key occupies on disk, including its length prefix.
    fn byte_length(&self) -> usize;

    /// The id the key is grouped by (parent folder or owning file).
    fn primary_id(&self) -> u32;

    /// The smallest possible key with this primary id.
    fn first_of(primary_id: u32) -> Self;
}

/// A UTF-16 name as stored on disk.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HfsName(Vec<u16>);

impl HfsName {
    pub const MAX_LEN: usize = 255;

    /// Canonical (NFD) form of `name`, the form catalog names are stored in.
    pub fn from_str(name: &str) -> Self {
        HfsName(name.nfd().collect::<String>().encode_utf16().collect())
    }

    /// `name` as UTF-16 without normalization.
    pub fn from_str_verbatim(name: &str) -> Self {
        HfsName(name.encode_utf16().collect())
    }

    pub fn from_utf16(units: Vec<u16>) -> Self {
        HfsName(units)
    }

    pub fn as_utf16(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes to a `String`, replacing unpaired surrogates with U+FFFD.
    pub fn to_string_lossy(&self) -> String {
        char::decode_utf16(self.0.iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    pub(crate) fn parse(source: &mut ByteReader<'_>, max_len: usize) -> Result<Self> {
        let count = source.read_u16_be()? as usize;
        if count > max_len {
            return Err(Error::InvalidKey("name longer than the format allows"));
        }
        Ok(HfsName(source.read_utf16_be(count)?))
    }
}

impl fmt::Debug for HfsName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for c in char::decode_utf16(self.0.iter().copied()) {
            match c {
                Ok(ch) if !ch.is_control() => write!(f, "{ch}")?,
                Ok(ch) => write!(f, "\\u{{{:04X}}}", ch as u32)?,
                Err(e) => write!(f, "\\u{{{:04X}}}", e.unpaired_surrogate())?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for HfsName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for ch in char::decode_utf16(self.0.iter().copied()).flatten() {
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

/// Rounds a key's on-disk size up so the record data after it is 2-byte aligned.
fn padded(len: usize) -> usize {
    (len + 1) & !1
}

/// Key length field for a key whose name has `name_len` code units.
/// Saturates for names no on-disk key can hold.
fn key_length(min_length: u16, name_len: usize) -> u16 {
    name_len
        .checked_mul(2)
        .and_then(|bytes| u16::try_from(bytes).ok())
        .and_then(|bytes| bytes.checked_add(min_length))
        .unwrap_or(u16::MAX)
}

#[derive(Clone)]
pub struct CatalogKey {
    key_length: u16,
    pub parent_id: CatalogNodeId,
    pub node_name: HfsName,
}

impl CatalogKey {
    const MIN_LENGTH: u16 = 6;

    pub fn new(parent_id: CatalogNodeId, node_name: HfsName) -> Self {
        let key_length = key_length(Self::MIN_LENGTH, node_name.len());
        Self {
            key_length,
            parent_id,
            node_name,
        }
    }
}

impl Key for CatalogKey {
    fn parse(record: &[u8]) -> Result<Self> {
        let mut source = ByteReader::new(record);
        let key_length = source.read_u16_be()?;
        if key_length < Self::MIN_LENGTH {
            return Err(Error::InvalidKey("catalog key length below minimum"));
        }
        let mut body = ByteReader::new(source.take(key_length as usize)?);
        let parent_id = body.read_u32_be()?;
        let node_name = HfsName::parse(&mut body, HfsName::MAX_LEN)?;
        Ok(Self {
            key_length,
            parent_id,
            node_name,
        })
    }

    fn byte_length(&self) -> usize {
        padded(2 + self.key_length as usize)
    }

    fn primary_id(&self) -> u32 {
        self.parent_id
    }

    /// Sorts first among the parent's entries: the key of its thread record.
    fn first_of(parent_id: CatalogNodeId) -> Self {
        Self::new(parent_id, HfsName::default())
    }
}

impl Ord for CatalogKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parent_id
            .cmp(&other.parent_id)
            .then_with(|| self.node_name.cmp(&other.node_name))
    }
}

impl PartialOrd for CatalogKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CatalogKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CatalogKey {}

impl fmt::Debug for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {:?})", self.parent_id, self.node_name)
    }
}

#[derive(Clone)]
pub struct AttributeKey {
    key_length: u16,
    pub file_id: CatalogNodeId,
    /// Non-zero only on extent continuation records of large fork attributes.
    pub start_block: u32,
    pub attribute_name: HfsName,
}

impl AttributeKey {
    const MIN_LENGTH: u16 = 12;
    pub const MAX_NAME_LEN: usize = 127;

    pub fn new(file_id: CatalogNodeId, attribute_name: HfsName) -> Self {
        let key_length = key_length(Self::MIN_LENGTH, attribute_name.len());
        Self {
            key_length,
            file_id,
            start_block: 0,
            attribute_name,
        }
    }
}

impl Key for AttributeKey {
    fn parse(record: &[u8]) -> Result<Self> {
        let mut source = ByteReader::new(record);
        let key_length = source.read_u16_be()?;
        if key_length < Self::MIN_LENGTH {
            return Err(Error::InvalidKey("attribute key length below minimum"));
        }
        let mut body = ByteReader::new(source.take(key_length as usize)?);
        body.skip(2)?; // pad
        let file_id = body.read_u32_be()?;
        let start_block = body.read_u32_be()?;
        let attribute_name = HfsName::parse(&mut body, Self::MAX_NAME_LEN)?;
        Ok(Self {
            key_length,
            file_id,
            start_block,
            attribute_name,
        })
    }

    fn byte_length(&self) -> usize {
        padded(2 + self.key_length as usize)
    }

    fn primary_id(&self) -> u32 {
        self.file_id
    }

    fn first_of(file_id: CatalogNodeId) -> Self {
        Self::new(file_id, HfsName::default())
    }
}

impl Ord for AttributeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_id
            .cmp(&other.file_id)
            .then_with(|| self.attribute_name.cmp(&other.attribute_name))
            .then_with(|| self.start_block.cmp(&other.start_block))
    }
}

impl PartialOrd for AttributeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AttributeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AttributeKey {}

impl fmt::Debug for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({}, {:?}, {})",
            self.file_id, self.attribute_name, self.start_block
        )
    }
}
