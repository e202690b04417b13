use std::io;
use std::os::raw::c_int;

use thiserror::Error;

type ErrorNum = c_int;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("device error: {0}")]
    Device(#[from] io::Error),
    #[error("no free block left on the volume")]
    NoFreeBlock,
    #[error("not a tinyfs volume: {0}")]
    Format(String),
    #[error("directory is misaligned: {names} names but {numbers} inode numbers")]
    DirAlignment { names: usize, numbers: usize },
    #[error("a volume is already mounted")]
    AlreadyMounted,
    #[error("no volume is mounted")]
    NotMounted,
    #[error("file {0:?} already exists")]
    DuplicateName(String),
    #[error("file {0:?} not found")]
    NotFound(String),
    #[error("end of file")]
    EndOfFile,
    #[error("offset {offset} is outside of file of size {size}")]
    OutOfRange { offset: i64, size: u64 },
    #[error("{size} bytes exceed the maximum file size of {max} bytes")]
    FileTooLarge { size: usize, max: usize },
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("invalid volume size of {0} bytes")]
    InvalidVolumeSize(u64),
    #[error("bad file descriptor {0}")]
    BadDescriptor(u32),
    #[error("block {0} is not allocated")]
    InvalidBlock(u64),
}

pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    pub(crate) fn format(message: &str) -> FsError {
        FsError::Format(message.to_string())
    }

    pub(crate) fn device(message: &str) -> FsError {
        FsError::Device(io::Error::new(io::ErrorKind::InvalidInput, message.to_string()))
    }

    pub fn errno(&self) -> ErrorNum {
        match self {
            FsError::Device(_) | FsError::Format(_) | FsError::DirAlignment { .. } => libc::EIO,
            FsError::InvalidBlock(_) => libc::EIO,
            FsError::NoFreeBlock => libc::ENOSPC,
            FsError::AlreadyMounted => libc::EBUSY,
            FsError::NotMounted => libc::ENODEV,
            FsError::DuplicateName(_) => libc::EEXIST,
            FsError::NotFound(_) => libc::ENOENT,
            FsError::EndOfFile => libc::ENODATA,
            FsError::OutOfRange { .. } | FsError::InvalidVolumeSize(_) => libc::EINVAL,
            FsError::FileTooLarge { .. } => libc::EFBIG,
            FsError::InvalidName(_) => libc::ENAMETOOLONG,
            FsError::BadDescriptor(_) => libc::EBADF,
        }
    }
}
