use std::collections::HashMap;

use crate::consts::{BlockPointer, FileDescriptor};
use crate::util::error::{FsError, Result};

/// Cursor state of one open file. Never persisted.
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct Handle {
    pub(crate) inode: BlockPointer,
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FileTable {
    handles: HashMap<FileDescriptor, Handle>,
    next: FileDescriptor,
}

impl FileTable {
    pub fn open(&mut self, inode: BlockPointer, size: u64) -> FileDescriptor {
        // wraps around, skipping descriptors that are still open
        let mut descriptor = self.next;
        while self.handles.contains_key(&descriptor) {
            descriptor = descriptor.wrapping_add(1);
        }
        self.next = descriptor.wrapping_add(1);
        self.handles.insert(descriptor, Handle { inode, offset: 0, size });
        descriptor
    }

    pub fn close(&mut self, descriptor: FileDescriptor) -> Result<Handle> {
        self.handles.remove(&descriptor).ok_or(FsError::BadDescriptor(descriptor))
    }

    pub fn get(&self, descriptor: FileDescriptor) -> Result<&Handle> {
        self.handles.get(&descriptor).ok_or(FsError::BadDescriptor(descriptor))
    }

    pub fn get_mut(&mut self, descriptor: FileDescriptor) -> Result<&mut Handle> {
        self.handles.get_mut(&descriptor).ok_or(FsError::BadDescriptor(descriptor))
    }

    /// Refreshes the cached size of every handle open on `inode`.
    pub fn resize(&mut self, inode: BlockPointer, size: u64) {
        for handle in self.handles.values_mut().filter(|handle| handle.inode == inode) {
            handle.size = size;
        }
    }

    /// Drops every handle open on `inode`.
    pub fn invalidate(&mut self, inode: BlockPointer) {
        self.handles.retain(|_, handle| handle.inode != inode);
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handles.len()
    }
}
