use alloc::format;

use crate::device::BlockDevice;
use crate::internal::ForkData;
use crate::{Error, Result};

/// A fork descriptor bound to the volume's allocation block size.
///
/// Translates logical fork offsets into device reads across the fork's
/// inline extents. Data mapped only through the extents overflow file is
/// reported as [`Error::NotImplemented`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Fork {
    pub data: ForkData,
    pub block_size: u32,
}

impl Fork {
    pub fn new(data: ForkData, block_size: u32) -> Self {
        Self { data, block_size }
    }

    /// Logical size in bytes.
    pub fn len(&self) -> u64 {
        self.data.logical_size
    }

    /// True when the fork has no data or no allocated extents.
    pub fn is_empty(&self) -> bool {
        self.data.logical_size == 0 || self.data.used_extents().next().is_none()
    }

    /// Bytes covered by the inline extents.
    pub fn mapped_len(&self) -> Result<u64> {
        self.data.used_extents().try_fold(0u64, |total, e| {
            total
                .checked_add(e.block_count as u64 * self.block_size as u64)
                .ok_or_else(|| self.overflow())
        })
    }

    fn overflow(&self) -> Error {
        Error::InvalidArgument(format!(
            "extents with block size {} overflow a 64-bit offset",
            self.block_size
        ))
    }

    /// Fills `dest` from logical `offset`, splitting the read at extent
    /// boundaries.
    pub fn read<D: BlockDevice + ?Sized>(
        &self,
        device: &D,
        offset: u64,
        dest: &mut [u8],
    ) -> Result<()> {
        let end = offset.checked_add(dest.len() as u64);
        if end.is_none_or(|end| end > self.data.logical_size) {
            return Err(Error::InvalidArgument(format!(
                "read of {} bytes at {offset} outside fork of {} bytes",
                dest.len(),
                self.data.logical_size
            )));
        }
        if dest.is_empty() {
            return Ok(());
        }
        if self.block_size == 0 {
            return Err(Error::InvalidArgument("block size of zero".into()));
        }

        let block_size = self.block_size as u64;
        let mut done = 0usize;
        let mut extent_begin = 0u64;
        for extent in self.data.used_extents() {
            let extent_end = extent_begin
                .checked_add(extent.block_count as u64 * block_size)
                .ok_or_else(|| self.overflow())?;
            let position = offset + done as u64;
            if position < extent_end {
                let within = position - extent_begin;
                let count = (extent_end - position).min((dest.len() - done) as u64) as usize;
                let physical = (extent.start_block as u64 * block_size)
                    .checked_add(within)
                    .ok_or_else(|| self.overflow())?;
                tracing::trace!(position, physical, count, "fork read");
                device.read_at(physical, &mut dest[done..done + count])?;
                done += count;
                if done == dest.len() {
                    return Ok(());
                }
            }
            extent_begin = extent_end;
        }
        Err(Error::NotImplemented(
            "fork data mapped through the extents overflow file",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::ExtentDescriptor;
    use alloc::vec;
    use alloc::vec::Vec;

    const BLOCK: u32 = 16;

    fn fork(logical_size: u64, extents: &[(u32, u32)]) -> Fork {
        let mut data = ForkData {
            logical_size,
            ..ForkData::default()
        };
        for (slot, &(start_block, block_count)) in data.extents.iter_mut().zip(extents) {
            *slot = ExtentDescriptor {
                start_block,
                block_count,
            };
        }
        Fork::new(data, BLOCK)
    }

    /// Device image where every byte holds its own block number.
    fn numbered_blocks(blocks: usize) -> Vec<u8> {
        (0..blocks * BLOCK as usize)
            .map(|i| (i / BLOCK as usize) as u8)
            .collect()
    }

    #[test]
    fn reads_follow_extent_order_not_block_order() {
        let device = numbered_blocks(16);
        let fork = fork(48, &[(9, 1), (2, 2)]);
        let mut buf = vec![0u8; 48];
        fork.read(&device, 0, &mut buf).unwrap();
        assert!(buf[..16].iter().all(|&b| b == 9));
        assert!(buf[16..32].iter().all(|&b| b == 2));
        assert!(buf[32..].iter().all(|&b| b == 3));
    }

    #[test]
    fn read_spanning_an_extent_boundary() {
        let device = numbered_blocks(16);
        let fork = fork(48, &[(9, 1), (2, 2)]);
        let mut buf = [0u8; 4];
        fork.read(&device, 14, &mut buf).unwrap();
        assert_eq!(buf, [9, 9, 2, 2]);
    }

    #[test]
    fn reads_past_logical_size_are_invalid() {
        let device = numbered_blocks(4);
        let fork = fork(20, &[(0, 2)]);
        let mut buf = [0u8; 8];
        assert!(matches!(
            fork.read(&device, 16, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            fork.read(&device, u64::MAX, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
        fork.read(&device, 12, &mut buf).unwrap();
    }

    #[test]
    fn unmapped_tail_needs_overflow_extents() {
        let device = numbered_blocks(4);
        // logical size claims more than the single extent maps
        let fork = fork(64, &[(1, 1)]);
        assert_eq!(fork.mapped_len().unwrap(), 16);
        let mut buf = [0u8; 8];
        fork.read(&device, 0, &mut buf).unwrap();
        assert!(matches!(
            fork.read(&device, 12, &mut buf),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn empty_forks() {
        assert!(fork(0, &[(1, 1)]).is_empty());
        assert!(fork(100, &[]).is_empty());
        assert!(!fork(100, &[(1, 1)]).is_empty());
    }

    #[test]
    fn extent_offsets_that_overflow_are_invalid() {
        let device = numbered_blocks(4);
        let mut huge = fork(u64::MAX, &[(0, u32::MAX); 8]);
        huge.block_size = u32::MAX;
        assert!(matches!(huge.mapped_len(), Err(Error::InvalidArgument(_))));

        // past the first extent, the second one's end no longer fits in u64
        let mut buf = [0u8; 4];
        assert!(matches!(
            huge.read(&device, u64::MAX - 8, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
    }
}
