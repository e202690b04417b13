use std::path::Path;

use log::{debug, info};

use crate::consts::{BlockPointer, FileDescriptor, BLOCK_SIZE, MAX_BLOCK_COUNT, MIN_BLOCK_COUNT};
use crate::driver::{DeviceDriver, FileDrive};
use crate::ops::file::FileTable;
use crate::structure::block::BlockType;
use crate::structure::blockmap::ClaimPolicy;
use crate::structure::directory::Directory;
use crate::structure::inode::Inode;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};

mod file;

#[derive(Debug, PartialEq, Clone)]
pub struct FileStat {
    pub name: String,
    pub inode: BlockPointer,
    pub size: u64,
    pub blocks: u64,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Usage {
    pub block_count: u64,
    pub used_blocks: u64,
    pub files: usize,
}

impl Usage {
    pub fn total_bytes(&self) -> u64 {
        self.block_count * BLOCK_SIZE as u64
    }

    pub fn free_bytes(&self) -> u64 {
        (self.block_count - self.used_blocks) * BLOCK_SIZE as u64
    }
}

/// A session holding at most one mounted volume and its open files.
pub struct TinyFs<D: DeviceDriver = FileDrive> {
    policy: ClaimPolicy,
    structure: Option<Structure<D>>,
    files: FileTable,
}

fn mounted<D: DeviceDriver>(structure: &Option<Structure<D>>) -> Result<&Structure<D>> {
    structure.as_ref().ok_or(FsError::NotMounted)
}

fn mounted_mut<D: DeviceDriver>(structure: &mut Option<Structure<D>>) -> Result<&mut Structure<D>> {
    structure.as_mut().ok_or(FsError::NotMounted)
}

impl TinyFs<FileDrive> {
    /// Creates (or overwrites) the image at `path` with `bytes` bytes and
    /// formats it. The session stays unmounted.
    pub fn format<P: AsRef<Path>>(&mut self, path: P, bytes: u64) -> Result<()> {
        if self.is_mounted() {
            return Err(FsError::AlreadyMounted);
        }
        if !(MIN_BLOCK_COUNT..=MAX_BLOCK_COUNT).contains(&(bytes / BLOCK_SIZE as u64)) {
            return Err(FsError::InvalidVolumeSize(bytes));
        }

        let drive = FileDrive::open(path, bytes, BLOCK_SIZE)?;
        self.format_device(drive)
    }

    pub fn mount<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.is_mounted() {
            return Err(FsError::AlreadyMounted);
        }

        let drive = FileDrive::open(path, 0, BLOCK_SIZE)?;
        self.mount_device(drive)
    }
}

impl<D: DeviceDriver> Default for TinyFs<D> {
    fn default() -> Self {
        TinyFs::new()
    }
}

impl<D: DeviceDriver> TinyFs<D> {
    pub fn new() -> TinyFs<D> {
        TinyFs::with_policy(ClaimPolicy::default())
    }

    pub fn with_policy(policy: ClaimPolicy) -> TinyFs<D> {
        TinyFs { policy, structure: None, files: FileTable::default() }
    }

    pub fn is_mounted(&self) -> bool {
        self.structure.is_some()
    }

    pub fn format_device(&mut self, device: D) -> Result<()> {
        if self.is_mounted() {
            return Err(FsError::AlreadyMounted);
        }
        Structure::format(device, self.policy)?;
        Ok(())
    }

    pub fn mount_device(&mut self, device: D) -> Result<()> {
        if self.is_mounted() {
            return Err(FsError::AlreadyMounted);
        }
        self.structure = Some(Structure::mount(device, self.policy)?);
        Ok(())
    }

    /// Flushes the bitmap and directory, then releases the device. Open
    /// descriptors become invalid.
    pub fn unmount(&mut self) -> Result<()> {
        mounted_mut(&mut self.structure)?.sync()?;
        if let Some(structure) = self.structure.take() {
            structure.close();
        }
        self.files.clear();
        info!("volume unmounted");
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        mounted_mut(&mut self.structure)?.sync()
    }

    /// Opens `name`, creating an empty file when it does not exist yet.
    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        let structure = mounted_mut(&mut self.structure)?;

        let inode = match structure.directory.lookup(name) {
            Some(id) => Inode::read(&structure.io, id)?,
            None => {
                Directory::validate_name(name)?;
                let inode = Inode::create(structure, vec![], BlockType::Inode)?;
                if let Err(error) = structure.directory.insert(name, inode.id) {
                    inode.release_all(structure)?;
                    return Err(error);
                }
                debug!("created {:?} at inode {}", name, inode.id);
                inode
            }
        };

        let size = inode.size(&structure.io)?;
        Ok(self.files.open(inode.id, size))
    }

    pub fn close(&mut self, descriptor: FileDescriptor) -> Result<()> {
        mounted(&self.structure)?;
        self.files.close(descriptor)?;
        Ok(())
    }

    /// Replaces the whole file with `data` and rewinds the cursor.
    pub fn write(&mut self, descriptor: FileDescriptor, data: &[u8]) -> Result<()> {
        let structure = mounted_mut(&mut self.structure)?;
        let id = self.files.get(descriptor)?.inode;

        let mut inode = Inode::read(&structure.io, id)?;
        inode.write_all(structure, data)?;

        self.files.resize(id, data.len() as u64);
        self.files.get_mut(descriptor)?.offset = 0;
        Ok(())
    }

    pub fn read_byte(&mut self, descriptor: FileDescriptor) -> Result<u8> {
        let structure = mounted(&self.structure)?;
        let handle = self.files.get_mut(descriptor)?;
        if handle.offset >= handle.size {
            return Err(FsError::EndOfFile);
        }

        let inode = Inode::read(&structure.io, handle.inode)?;
        let bytes = inode.read_at(&structure.io, handle.offset as usize, 1)?;
        let byte = *bytes.first().ok_or(FsError::EndOfFile)?;
        handle.offset += 1;
        Ok(byte)
    }

    /// Reads up to `len` bytes from the cursor. Empty at end of file.
    pub fn read(&mut self, descriptor: FileDescriptor, len: usize) -> Result<Vec<u8>> {
        let structure = mounted(&self.structure)?;
        let handle = self.files.get_mut(descriptor)?;
        let len = len.min(handle.size.saturating_sub(handle.offset) as usize);
        if len == 0 {
            return Ok(Vec::new());
        }

        let inode = Inode::read(&structure.io, handle.inode)?;
        let bytes = inode.read_at(&structure.io, handle.offset as usize, len)?;
        handle.offset += bytes.len() as u64;
        Ok(bytes)
    }

    pub fn seek(&mut self, descriptor: FileDescriptor, offset: i64) -> Result<()> {
        mounted(&self.structure)?;
        let handle = self.files.get_mut(descriptor)?;
        if offset < 0 || offset as u64 > handle.size {
            return Err(FsError::OutOfRange { offset, size: handle.size });
        }
        handle.offset = offset as u64;
        Ok(())
    }

    /// Removes the file behind `descriptor` and frees all of its blocks.
    /// Every descriptor open on the file is invalidated.
    pub fn delete(&mut self, descriptor: FileDescriptor) -> Result<()> {
        let structure = mounted_mut(&mut self.structure)?;
        let id = self.files.get(descriptor)?.inode;

        let name = structure
            .directory
            .name_of(id)
            .map(str::to_string)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", id)))?;
        let inode = Inode::read(&structure.io, id)?;

        structure.directory.remove(&name)?;
        inode.release_all(structure)?;
        self.files.invalidate(id);
        debug!("deleted {:?}", name);
        Ok(())
    }

    pub fn stat(&self, name: &str) -> Result<FileStat> {
        let structure = mounted(&self.structure)?;
        let id = structure.directory.lookup(name).ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let inode = Inode::read(&structure.io, id)?;

        Ok(FileStat {
            name: name.to_string(),
            inode: id,
            size: inode.size(&structure.io)?,
            blocks: inode.block_count() as u64,
        })
    }

    pub fn name_of(&self, inode: BlockPointer) -> Result<String> {
        let structure = mounted(&self.structure)?;
        structure
            .directory
            .name_of(inode)
            .map(str::to_string)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", inode)))
    }

    pub fn list(&self) -> Result<Vec<FileStat>> {
        let structure = mounted(&self.structure)?;
        structure.directory.entries().map(|(name, _)| self.stat(name)).collect()
    }

    pub fn usage(&self) -> Result<Usage> {
        let structure = mounted(&self.structure)?;
        Ok(Usage {
            block_count: structure.block_count(),
            used_blocks: structure.block_map.used_count(),
            files: structure.directory.len(),
        })
    }
}
