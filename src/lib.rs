//! A small single-directory filesystem stored in fixed size blocks on a
//! disk image or any other block device.

pub mod consts;
pub mod driver;
pub mod fuse;
pub(crate) mod io;
pub mod ops;
pub(crate) mod structure;
pub mod util;

pub use driver::{DeviceDriver, FileDrive, MemoryDrive};
pub use ops::{FileStat, TinyFs, Usage};
pub use structure::blockmap::ClaimPolicy;
pub use util::error::{FsError, Result};
