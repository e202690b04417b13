use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use log::warn;

use crate::consts::{BlockPointer, FileDescriptor, BLOCK_SIZE, MAX_BLOCK_COUNT, MAX_FILE_SIZE};
use crate::driver::DeviceDriver;
use crate::ops::{FileStat, TinyFs};
use crate::util::error::{FsError, Result};

const TTL: Duration = Duration::from_secs(1);
pub const ROOT_INO: u64 = 1;

/// Exposes a mounted volume as a single flat directory.
pub struct TinyFuse<D: DeviceDriver> {
    fs: TinyFs<D>,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

fn ino_of(inode: BlockPointer) -> u64 {
    inode as u64 + 1
}

fn inode_of(ino: u64) -> Result<BlockPointer> {
    if ino <= ROOT_INO || ino > MAX_BLOCK_COUNT {
        return Err(FsError::NotFound(format!("ino {}", ino)));
    }
    Ok((ino - 1) as BlockPointer)
}

fn file_name(name: &OsStr) -> Result<&str> {
    name.to_str().ok_or_else(|| FsError::InvalidName(name.to_string_lossy().to_string()))
}

fn check_root(parent: u64) -> Result<()> {
    if parent != ROOT_INO {
        return Err(FsError::NotFound(format!("ino {}", parent)));
    }
    Ok(())
}

fn check_size(size: u64) -> Result<()> {
    if size > MAX_FILE_SIZE as u64 {
        return Err(FsError::FileTooLarge { size: usize::try_from(size).unwrap_or(usize::MAX), max: MAX_FILE_SIZE });
    }
    Ok(())
}

/// Overlays `data` onto `content` at `offset`, zero filling any gap.
pub fn splice(mut content: Vec<u8>, offset: usize, data: &[u8]) -> Vec<u8> {
    let end = offset + data.len();
    if content.len() < end {
        content.resize(end, 0);
    }
    content[offset..end].copy_from_slice(data);
    content
}

impl<D: DeviceDriver> TinyFuse<D> {
    pub fn new(fs: TinyFs<D>) -> TinyFuse<D> {
        TinyFuse { fs, uid: 0, gid: 0, mounted_at: SystemTime::now() }
    }

    fn attr(&self, ino: u64, kind: FileType, size: u64, blocks: u64) -> FileAttr {
        let (perm, nlink) = match kind {
            FileType::Directory => (0o755, 2),
            _ => (0o644, 1),
        };

        FileAttr {
            ino,
            size,
            blocks,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE as u32,
        }
    }

    fn stat_to_fileattr(&self, stat: &FileStat) -> FileAttr {
        self.attr(ino_of(stat.inode), FileType::RegularFile, stat.size, stat.blocks)
    }

    pub fn get_attr(&self, ino: u64) -> Result<FileAttr> {
        if ino == ROOT_INO {
            let usage = self.fs.usage()?;
            return Ok(self.attr(ROOT_INO, FileType::Directory, 0, usage.used_blocks));
        }

        let name = self.fs.name_of(inode_of(ino)?)?;
        Ok(self.stat_to_fileattr(&self.fs.stat(&name)?))
    }

    pub fn lookup_name(&self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        check_root(parent)?;
        Ok(self.stat_to_fileattr(&self.fs.stat(file_name(name)?)?))
    }

    pub fn entries(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>> {
        check_root(ino)?;
        let mut entries = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
        ];
        for stat in self.fs.list()? {
            entries.push((ino_of(stat.inode), FileType::RegularFile, stat.name));
        }
        Ok(entries)
    }

    pub fn create_file(&mut self, parent: u64, name: &OsStr) -> Result<(FileAttr, u64)> {
        check_root(parent)?;
        let name = file_name(name)?;
        let descriptor = self.fs.open(name)?;
        let attr = self.stat_to_fileattr(&self.fs.stat(name)?);
        Ok((attr, descriptor as u64))
    }

    pub fn open_file(&mut self, ino: u64) -> Result<u64> {
        let name = self.fs.name_of(inode_of(ino)?)?;
        Ok(self.fs.open(&name)? as u64)
    }

    pub fn release_file(&mut self, fh: u64) -> Result<()> {
        self.fs.close(fh as FileDescriptor)
    }

    fn contents(&mut self, descriptor: FileDescriptor) -> Result<Vec<u8>> {
        self.fs.seek(descriptor, 0)?;
        self.fs.read(descriptor, MAX_FILE_SIZE)
    }

    pub fn read_file(&mut self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>> {
        let descriptor = fh as FileDescriptor;
        match self.fs.seek(descriptor, offset) {
            Ok(()) => self.fs.read(descriptor, size as usize),
            Err(FsError::OutOfRange { .. }) if offset >= 0 => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    /// Partial writes are folded into the whole-file write of the volume.
    pub fn write_file(&mut self, fh: u64, offset: i64, data: &[u8]) -> Result<u32> {
        let descriptor = fh as FileDescriptor;
        if offset < 0 {
            return Err(FsError::OutOfRange { offset, size: 0 });
        }
        let end = (offset as u64).saturating_add(data.len() as u64);
        check_size(end)?;

        let content = splice(self.contents(descriptor)?, offset as usize, data);
        self.fs.write(descriptor, &content)?;
        Ok(data.len() as u32)
    }

    pub fn truncate(&mut self, ino: u64, fh: Option<u64>, size: u64) -> Result<FileAttr> {
        check_size(size)?;
        let descriptor = match fh {
            Some(fh) => fh as FileDescriptor,
            None => self.open_file(ino)? as FileDescriptor,
        };

        let result = self.contents(descriptor).and_then(|mut content| {
            content.resize(size as usize, 0);
            self.fs.write(descriptor, &content)
        });

        if fh.is_none() {
            self.fs.close(descriptor)?;
        }
        result?;
        self.get_attr(ino)
    }

    pub fn remove(&mut self, parent: u64, name: &OsStr) -> Result<()> {
        check_root(parent)?;
        let name = file_name(name)?;
        self.fs.stat(name)?;
        let descriptor = self.fs.open(name)?;
        self.fs.delete(descriptor)
    }

    fn fail(operation: &str, error: &FsError) -> c_int {
        warn!("{} failed: {}", operation, error);
        error.errno()
    }
}

impl<D: DeviceDriver> Filesystem for TinyFuse<D> {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        self.uid = req.uid();
        self.gid = req.gid();
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(error) = self.fs.unmount() {
            warn!("unmount failed: {}", error);
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_name(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(FsError::NotFound(_)) => reply.error(libc::ENOENT),
            Err(error) => reply.error(TinyFuse::<D>::fail("lookup", &error)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.get_attr(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(error) => reply.error(TinyFuse::<D>::fail("getattr", &error)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = match size {
            Some(size) => self.truncate(ino, fh, size),
            None => self.get_attr(ino),
        };
        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(error) => reply.error(TinyFuse::<D>::fail("setattr", &error)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = match self.entries(ino) {
            Ok(entries) => entries,
            Err(error) => return reply.error(TinyFuse::<D>::fail("readdir", &error)),
        };

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            // i + 1 is the offset of the next entry
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_file(parent, name) {
            Ok((attr, fh)) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(error) => reply.error(TinyFuse::<D>::fail("create", &error)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_file(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(error) => reply.error(TinyFuse::<D>::fail("open", &error)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_file(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(error) => reply.error(TinyFuse::<D>::fail("read", &error)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_file(fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(error) => reply.error(TinyFuse::<D>::fail("write", &error)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.release_file(fh) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(TinyFuse::<D>::fail("release", &error)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.remove(parent, name) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(TinyFuse::<D>::fail("unlink", &error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDrive;

    fn fuse() -> TinyFuse<MemoryDrive> {
        let drive = MemoryDrive::new(40 * BLOCK_SIZE as u64, BLOCK_SIZE);
        let mut fs = TinyFs::new();
        fs.format_device(drive.clone()).unwrap();
        fs.mount_device(drive).unwrap();
        TinyFuse::new(fs)
    }

    #[test]
    fn splice_overlays_and_extends() {
        assert_eq!(splice(b"hello".to_vec(), 1, b"EY"), b"hEYlo");
        assert_eq!(splice(b"ab".to_vec(), 4, b"cd"), b"ab\0\0cd");
        assert_eq!(splice(Vec::new(), 0, b""), b"");
    }

    #[test]
    fn create_write_read() {
        let mut fuse = fuse();
        let (attr, fh) = fuse.create_file(ROOT_INO, OsStr::new("notes")).unwrap();
        assert_eq!(attr.size, 0);
        assert_eq!(attr.kind, FileType::RegularFile);

        assert_eq!(fuse.write_file(fh, 0, b"hello world").unwrap(), 11);
        assert_eq!(fuse.write_file(fh, 6, b"tinyfs").unwrap(), 6);
        assert_eq!(fuse.read_file(fh, 0, 100).unwrap(), b"hello tinyfs");
        assert_eq!(fuse.read_file(fh, 6, 4).unwrap(), b"tiny");
        assert!(fuse.read_file(fh, 50, 4).unwrap().is_empty());

        let attr = fuse.lookup_name(ROOT_INO, OsStr::new("notes")).unwrap();
        assert_eq!(attr.size, 12);
        let fetched = fuse.get_attr(attr.ino).unwrap();
        assert_eq!((fetched.ino, fetched.size, fetched.blocks), (attr.ino, 12, 1));
        fuse.release_file(fh).unwrap();
    }

    #[test]
    fn directory_listing() {
        let mut fuse = fuse();
        fuse.create_file(ROOT_INO, OsStr::new("a")).unwrap();
        fuse.create_file(ROOT_INO, OsStr::new("b")).unwrap();

        let names: Vec<String> = fuse.entries(ROOT_INO).unwrap().into_iter().map(|entry| entry.2).collect();
        assert_eq!(names, vec![".", "..", "a", "b"]);
        assert!(fuse.entries(5).is_err());
        assert_eq!(fuse.get_attr(ROOT_INO).unwrap().kind, FileType::Directory);
    }

    #[test]
    fn truncate_and_unlink() {
        let mut fuse = fuse();
        let (attr, fh) = fuse.create_file(ROOT_INO, OsStr::new("a")).unwrap();
        fuse.write_file(fh, 0, &[7; 600]).unwrap();
        fuse.release_file(fh).unwrap();

        assert_eq!(fuse.truncate(attr.ino, None, 10).unwrap().size, 10);
        assert_eq!(fuse.truncate(attr.ino, None, 20).unwrap().blocks, 1);

        fuse.remove(ROOT_INO, OsStr::new("a")).unwrap();
        assert!(matches!(fuse.lookup_name(ROOT_INO, OsStr::new("a")), Err(FsError::NotFound(_))));
        assert!(matches!(fuse.remove(ROOT_INO, OsStr::new("a")), Err(FsError::NotFound(_))));
        assert!(fuse.get_attr(attr.ino).is_err());
    }

    #[test]
    fn inode_numbers() {
        assert_eq!(ino_of(39), 40);
        assert_eq!(inode_of(40).unwrap(), 39);
        assert!(inode_of(ROOT_INO).is_err());
        assert!(inode_of(MAX_BLOCK_COUNT + 1).is_err());
    }

    #[test]
    fn oversized_writes_and_truncates_are_refused() {
        let mut fuse = fuse();
        let (attr, fh) = fuse.create_file(ROOT_INO, OsStr::new("a")).unwrap();
        fuse.write_file(fh, 0, b"keep").unwrap();

        assert!(matches!(fuse.write_file(fh, i64::MAX, b"xy"), Err(FsError::FileTooLarge { .. })));
        assert!(matches!(fuse.write_file(fh, MAX_FILE_SIZE as i64, b"x"), Err(FsError::FileTooLarge { .. })));
        assert!(matches!(fuse.truncate(attr.ino, None, 1 << 40), Err(FsError::FileTooLarge { .. })));
        assert!(matches!(fuse.truncate(attr.ino, Some(fh), u64::MAX), Err(FsError::FileTooLarge { .. })));
        assert_eq!(FsError::FileTooLarge { size: 0, max: 0 }.errno(), libc::EFBIG);

        assert_eq!(fuse.read_file(fh, 0, 10).unwrap(), b"keep");
        assert_eq!(fuse.write_file(fh, 300, b"z").unwrap(), 1);
        assert_eq!(fuse.get_attr(attr.ino).unwrap().size, 301);
    }
}
