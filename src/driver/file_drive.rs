use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::driver::{check_sector, DeviceDriver};

/// A disk image backed by a regular file.
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Opens `path` as a device. A non-zero `bytes` (re)creates the image with
    /// that size, zero opens an existing image as is.
    pub fn open<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        if bytes == 0 {
            FileDrive::open_existing(path, sector_size)
        } else {
            FileDrive::create(path, bytes, sector_size)
        }
    }

    pub fn create<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(bytes)?;
        Ok(FileDrive { file, bytes, sector_size })
    }

    pub fn open_existing<P: AsRef<Path>>(path: P, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let bytes = file.metadata()?.len();
        Ok(FileDrive { file, bytes, sector_size })
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        check_sector(index, self.get_sector_count())?;
        let mut buffer = vec![0; self.sector_size];
        self.file.read_exact_at(&mut buffer, index * self.sector_size as u64)?;
        Ok(buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        check_sector(index, self.get_sector_count())?;
        if data.len() != self.sector_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector size mismatch - expected {}, got {}", self.sector_size, data.len()),
            ));
        }
        self.file.write_all_at(data, index * self.sector_size as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        let mut drive = FileDrive::open(&path, 1024 * 256, 256).unwrap();

        let sector0 = vec![0x42; 256];
        let sector1023 = vec![0x52; 256];
        drive.write_sector(0, &sector0).unwrap();
        drive.write_sector(1023, &sector1023).unwrap();

        assert_eq!(drive.read_sector(0).unwrap(), sector0);
        assert_eq!(drive.read_sector(1023).unwrap(), sector1023);
        assert_eq!(drive.read_sector(2).unwrap(), vec![0; 256]);
        assert!(drive.read_sector(1024).is_err());
        assert!(drive.write_sector(1, &[0; 12]).is_err());
    }

    #[test]
    fn reopen_keeps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        {
            let mut drive = FileDrive::open(&path, 4 * 256, 256).unwrap();
            drive.write_sector(3, &vec![7; 256]).unwrap();
            drive.flush().unwrap();
        }
        let drive = FileDrive::open(&path, 0, 256).unwrap();
        assert_eq!(drive.get_sector_count(), 4);
        assert_eq!(drive.read_sector(3).unwrap(), vec![7; 256]);
    }

    #[test]
    fn open_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileDrive::open(dir.path().join("missing.img"), 0, 256).is_err());
    }
}
