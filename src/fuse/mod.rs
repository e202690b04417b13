use std::io;
use std::path::Path;

use fuser::MountOption;
use log::info;

use crate::driver::FileDrive;
use crate::ops::TinyFs;

pub mod filesystem;

pub use filesystem::TinyFuse;

/// Serves a mounted session at `mountpoint` until the kernel unmounts it.
/// The volume is synced and released on the way out.
pub fn mount<P: AsRef<Path>>(fs: TinyFs<FileDrive>, mountpoint: P) -> io::Result<()> {
    let options = [MountOption::FSName("tinyfs".to_string()), MountOption::RW, MountOption::DefaultPermissions];
    info!("serving volume at {}", mountpoint.as_ref().display());
    fuser::mount2(TinyFuse::new(fs), mountpoint, &options)
}
