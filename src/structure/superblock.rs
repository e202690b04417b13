use crate::consts::{BlockPointer, BLOCK_SIZE, MAGIC, SUPERBLOCK};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

const MAGIC_BYTE: usize = 0;
const DIR_NUMBERS_BYTE: usize = 1;
const DIR_NAMES_BYTE: usize = 2;
const FREE_MASK_BYTE: usize = 3;
const BLOCK_COUNT_BYTES: usize = 4;

#[derive(Debug, PartialEq, Clone)]
pub struct SuperBlock {
    pub magic: u8,
    pub free_mask: BlockPointer,
    pub dir_numbers: BlockPointer,
    pub dir_names: BlockPointer,
    pub block_count: u64,
}

impl SuperBlock {
    pub fn new(block_count: u64) -> SuperBlock {
        SuperBlock { magic: MAGIC, free_mask: 0, dir_numbers: 0, dir_names: 0, block_count }
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>) -> Result<SuperBlock> {
        let buffer = io.read_block(SUPERBLOCK)?;
        let superblock = SuperBlock::from_bytes(&buffer)?;

        if superblock.block_count != io.block_count {
            return Err(FsError::Format(format!(
                "superblock records {} blocks but the device holds {}",
                superblock.block_count, io.block_count
            )));
        }

        for pointer in [superblock.free_mask, superblock.dir_numbers, superblock.dir_names] {
            if pointer == SUPERBLOCK || pointer as u64 >= superblock.block_count {
                return Err(FsError::Format(format!("bootstrap inode pointer {} out of range", pointer)));
            }
        }

        Ok(superblock)
    }

    pub fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let mut buffer = self.to_bytes();
        buffer.resize(BLOCK_SIZE, 0);
        io.write_block(SUPERBLOCK, &buffer)
    }
}

impl ByteSerializable for SuperBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; SuperBlock::size_on_disk()];
        buffer[MAGIC_BYTE] = self.magic;
        buffer[DIR_NUMBERS_BYTE] = self.dir_numbers;
        buffer[DIR_NAMES_BYTE] = self.dir_names;
        buffer[FREE_MASK_BYTE] = self.free_mask;
        buffer[BLOCK_COUNT_BYTES..BLOCK_COUNT_BYTES + 2].copy_from_slice(&(self.block_count as u16).to_le_bytes());
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SuperBlock::size_on_disk() || bytes[MAGIC_BYTE] != MAGIC {
            return Err(FsError::format("magic number missing"));
        }

        let block_count = u16::from_le_bytes([bytes[BLOCK_COUNT_BYTES], bytes[BLOCK_COUNT_BYTES + 1]]) as u64;
        Ok(SuperBlock {
            magic: bytes[MAGIC_BYTE],
            free_mask: bytes[FREE_MASK_BYTE],
            dir_numbers: bytes[DIR_NUMBERS_BYTE],
            dir_names: bytes[DIR_NAMES_BYTE],
            block_count,
        })
    }
}

impl KnownSize for SuperBlock {
    fn size_on_disk() -> usize {
        BLOCK_COUNT_BYTES + 2
    }
}
