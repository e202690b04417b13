use log::info;

use crate::consts::{BlockPointer, BLOCK_SIZE, MAX_BLOCK_COUNT, MIN_BLOCK_COUNT, SUPERBLOCK};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::block::{data_block, BlockType};
use crate::structure::blockmap::{BlockMap, ClaimPolicy};
use crate::structure::directory::Directory;
use crate::structure::inode::Inode;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{FsError, Result};

pub mod block;
pub mod blockmap;
pub mod directory;
pub mod inode;
pub mod superblock;

/// Everything a mounted volume keeps in memory. The bitmap and the directory
/// are the source of truth until they are written back by `sync`.
pub struct Structure<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) superblock: SuperBlock,
    pub(crate) block_map: BlockMap,
    pub(crate) directory: Directory,
    pub(crate) policy: ClaimPolicy,
}

impl<A: DeviceDriver> Structure<A> {
    /// Lays out a fresh volume on `device` and hands the device back.
    pub fn format(device: A, policy: ClaimPolicy) -> Result<A> {
        let bytes = device.get_size();
        let io = IO::new(device, BLOCK_SIZE)?;
        let block_count = io.block_count;
        if !(MIN_BLOCK_COUNT..=MAX_BLOCK_COUNT).contains(&block_count) {
            return Err(FsError::InvalidVolumeSize(bytes));
        }

        let mut structure = Structure {
            io,
            superblock: SuperBlock::new(block_count),
            block_map: BlockMap::new(block_count),
            directory: Directory::new(),
            policy,
        };

        let mut free_mask = structure.create_bootstrap(BlockType::FreeMask)?;
        let dir_numbers = structure.create_bootstrap(BlockType::DirentNum)?;
        let dir_names = structure.create_bootstrap(BlockType::DirentName)?;

        structure.superblock.free_mask = free_mask.id;
        structure.superblock.dir_numbers = dir_numbers.id;
        structure.superblock.dir_names = dir_names.id;

        let mask = structure.block_map.to_bytes();
        free_mask.write_all(&mut structure, &mask)?;
        structure.superblock.write(&mut structure.io)?;
        structure.io.flush()?;

        info!("formatted volume with {} blocks", block_count);
        Ok(structure.io.into_device())
    }

    fn create_bootstrap(&mut self, kind: BlockType) -> Result<Inode> {
        let data = self.block_map.claim(self.policy.direction_for(BlockType::Data))?;
        self.io.write_block(data, &data_block(&[]))?;
        Inode::create(self, vec![data], kind)
    }

    fn read_bootstrap(io: &IO<A>, pointer: BlockPointer, kind: BlockType) -> Result<Inode> {
        let inode = Inode::read(io, pointer)?;
        if inode.kind != kind {
            return Err(FsError::Format(format!("block {} should hold the {:?} inode", pointer, kind)));
        }
        Ok(inode)
    }

    pub fn mount(device: A, policy: ClaimPolicy) -> Result<Structure<A>> {
        let io = IO::new(device, BLOCK_SIZE)?;
        let superblock = SuperBlock::read(&io)?;

        let free_mask = Structure::read_bootstrap(&io, superblock.free_mask, BlockType::FreeMask)?;
        let block_map = BlockMap::from_bytes(superblock.block_count, &free_mask.read_all(&io)?)?;

        let numbers = Structure::read_bootstrap(&io, superblock.dir_numbers, BlockType::DirentNum)?;
        let names = Structure::read_bootstrap(&io, superblock.dir_names, BlockType::DirentName)?;
        let directory = Directory::from_bytes(&names.read_all(&io)?, &numbers.read_all(&io)?)?;

        let mut reserved = vec![SUPERBLOCK, free_mask.id, numbers.id, names.id];
        for inode in [&free_mask, &numbers, &names] {
            reserved.extend_from_slice(&inode.pointers);
        }

        for (name, inode) in directory.entries() {
            if inode as u64 >= superblock.block_count || block_map.is_free(inode as u64) {
                return Err(FsError::Format(format!("{:?} points at unallocated block {}", name, inode)));
            }
            if reserved.contains(&inode) {
                return Err(FsError::Format(format!("{:?} points at bookkeeping block {}", name, inode)));
            }
        }

        info!(
            "mounted volume with {} blocks, {} used, {} files",
            superblock.block_count,
            block_map.used_count(),
            directory.len()
        );
        Ok(Structure { io, superblock, block_map, directory, policy })
    }

    /// Writes the directory and then the bitmap back through their inodes.
    ///
    /// Fails with `NoFreeBlock` before anything is written when the three
    /// chains cannot all be stored, so the names and numbers on disk never
    /// drift apart.
    pub fn sync(&mut self) -> Result<()> {
        let numbers = self.directory.numbers_to_bytes();
        let names = self.directory.names_to_bytes();
        let mut numbers_inode = Inode::read(&self.io, self.superblock.dir_numbers)?;
        let mut names_inode = Inode::read(&self.io, self.superblock.dir_names)?;
        let mut free_mask = Inode::read(&self.io, self.superblock.free_mask)?;

        let mask_len = self.block_map.to_bytes().len();
        let mut free = self.block_map.free_count();
        for (inode, len) in [(&numbers_inode, numbers.len()), (&names_inode, names.len()), (&free_mask, mask_len)] {
            let (claims, releases) = inode.chain_delta(len);
            free = free.checked_sub(claims as u64).ok_or(FsError::NoFreeBlock)? + releases as u64;
        }

        numbers_inode.write_all(self, &numbers)?;
        names_inode.write_all(self, &names)?;

        loop {
            let mask = self.block_map.to_bytes();
            free_mask.write_all(self, &mask)?;
            // only differs if the mask inode had to grow its chain
            if self.block_map.to_bytes() == mask {
                break;
            }
        }

        self.io.flush()
    }

    pub fn close(self) -> A {
        self.io.into_device()
    }

    pub fn block_count(&self) -> u64 {
        self.superblock.block_count
    }
}
