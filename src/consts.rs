use std::mem::size_of;

pub type BlockPointer = u8;
pub type FileDescriptor = u32;

pub const BLOCK_SIZE: usize = 256;
pub const HEADER_SIZE: usize = 8;
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - HEADER_SIZE;
pub(crate) const POINTER_WIDTH: usize = size_of::<BlockPointer>();

/// Pointer slots in a single inode block. There is no second level of
/// indirection, so this caps the number of data blocks per file.
pub const MAX_POINTERS: usize = PAYLOAD_SIZE / POINTER_WIDTH;
pub const MAX_FILE_SIZE: usize = MAX_POINTERS * PAYLOAD_SIZE;

/// Every block number has to fit in one pointer.
pub const MAX_BLOCK_COUNT: u64 = 1 << (8 * POINTER_WIDTH);
/// Superblock plus three bootstrap inodes and their data blocks.
pub const MIN_BLOCK_COUNT: u64 = 7;

pub const DEFAULT_VOLUME_SIZE: u64 = 10 * 1024;
pub const MAX_NAME_LENGTH: usize = 16;

pub(crate) const MAGIC: u8 = 0x5A;
pub(crate) const SUPERBLOCK: BlockPointer = 0;
