use log::debug;

use crate::consts::{BlockPointer, SUPERBLOCK};
use crate::structure::block::BlockType;
use crate::util::error::{FsError, Result};

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Direction {
    Low,
    High,
}

/// Which end of the bitmap a claim scans from. Keeping long lived inode
/// blocks at the top of the volume and churning data at the bottom is only
/// a fragmentation heuristic.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub enum ClaimPolicy {
    #[default]
    Split,
    LowFirst,
}

impl ClaimPolicy {
    pub fn direction_for(&self, kind: BlockType) -> Direction {
        match (self, kind) {
            (ClaimPolicy::Split, BlockType::Inode) => Direction::High,
            _ => Direction::Low,
        }
    }
}

/// Free space bitmap, one bit per block of the volume.
#[derive(PartialEq, Debug, Clone)]
pub struct BlockMap {
    block_count: u64,
    data: Vec<u8>,
}

impl BlockMap {
    pub fn new(block_count: u64) -> BlockMap {
        let data = vec![0; BlockMap::byte_len(block_count)];
        let mut map = BlockMap { block_count, data };
        map.mark_used_mem(SUPERBLOCK as u64);
        map
    }

    pub fn from_bytes(block_count: u64, bytes: &[u8]) -> Result<BlockMap> {
        let len = BlockMap::byte_len(block_count);
        if bytes.len() < len {
            return Err(FsError::Format(format!(
                "free mask holds {} bytes, {} blocks need {}",
                bytes.len(),
                block_count,
                len
            )));
        }

        let map = BlockMap { block_count, data: bytes[..len].to_vec() };
        if map.is_free(SUPERBLOCK as u64) {
            return Err(FsError::format("free mask marks the superblock as free"));
        }
        Ok(map)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn byte_len(block_count: u64) -> usize {
        let mut len = block_count as usize / 8;
        if block_count % 8 != 0 {
            len += 1;
        }
        len
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn claim(&mut self, direction: Direction) -> Result<BlockPointer> {
        let found = match direction {
            Direction::Low => (0..self.block_count).find(|i| self.is_free(*i)),
            Direction::High => (0..self.block_count).rev().find(|i| self.is_free(*i)),
        };

        match found {
            Some(index) => {
                self.mark_used_mem(index);
                debug!("claimed block {} ({:?})", index, direction);
                Ok(index as BlockPointer)
            }
            None => Err(FsError::NoFreeBlock),
        }
    }

    pub fn release(&mut self, index: BlockPointer) -> Result<()> {
        let index = index as u64;
        if index == SUPERBLOCK as u64 || index >= self.block_count || self.is_free(index) {
            return Err(FsError::InvalidBlock(index));
        }
        self.mark_free_mem(index);
        debug!("released block {}", index);
        Ok(())
    }

    /// Marks an already known block as used again, for rolling back a release.
    pub(crate) fn mark_used(&mut self, index: BlockPointer) {
        self.mark_used_mem(index as u64);
    }

    pub fn is_free(&self, index: u64) -> bool {
        self.data[(index / 8) as usize] & (1 << (index % 8)) == 0
    }

    pub fn is_used(&self, index: u64) -> bool {
        !self.is_free(index)
    }

    pub fn used_count(&self) -> u64 {
        (0..self.block_count).filter(|i| self.is_used(*i)).count() as u64
    }

    pub fn free_count(&self) -> u64 {
        self.block_count - self.used_count()
    }

    fn mark_used_mem(&mut self, index: u64) {
        let byte_index = (index / 8) as usize;
        let bit_index = (index % 8) as usize;
        self.data[byte_index] |= 1 << bit_index;
    }

    fn mark_free_mem(&mut self, index: u64) {
        let byte_index = (index / 8) as usize;
        let bit_index = (index % 8) as usize;
        self.data[byte_index] &= !(1 << bit_index);
    }
}
