//! The byte source every node and fork read goes through.

use alloc::format;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::{Error, Result};

/// Random-access reads from the underlying volume.
///
/// `read_at` takes `&self`: implementations that are `Sync` may be called from
/// several threads at once, and the B-tree engine relies on nothing else for
/// concurrent queries. Failures are returned as [`Error::Io`] and are never
/// retried by the engine.
pub trait BlockDevice {
    /// Fills `dest` with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()>;
}

impl BlockDevice for [u8] {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| Error::Io(format!("offset {offset} does not fit in memory")))?;
        let end = start
            .checked_add(dest.len())
            .filter(|&end| end <= self.len())
            .ok_or_else(|| {
                Error::Io(format!(
                    "read of {} bytes at {offset} past end of {} byte image",
                    dest.len(),
                    self.len()
                ))
            })?;
        dest.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

impl BlockDevice for Vec<u8> {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        self.as_slice().read_at(offset, dest)
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, dest)
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for Arc<T> {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, dest)
    }
}

/// Seekable streams have a shared cursor, so each read holds the lock across
/// the seek and the read.
#[cfg(not(target_os = "none"))]
impl<F: std::io::Read + std::io::Seek> BlockDevice for spin::Mutex<F> {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let mut stream = self.lock();
        stream
            .seek(std::io::SeekFrom::Start(offset))
            .map_err(|e| Error::Io(e.to_string()))?;
        stream.read_exact(dest).map_err(|e| Error::Io(e.to_string()))
    }
}

#[cfg(all(unix, not(target_os = "none")))]
impl BlockDevice for std::fs::File {
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.read_exact_at(dest, offset)
            .map_err(|e| Error::Io(e.to_string()))
    }
}
