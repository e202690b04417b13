use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::util::error::{FsError, Result};
use raw::{raw_read_block, raw_write_block};

mod raw;

pub struct IO<A: DeviceDriver> {
    device: A,
    pub block_size: usize,
    pub block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A, block_size: usize) -> Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if sector_size == 0 || block_size < sector_size || block_size % sector_size != 0 {
            return Err(FsError::device("block size must be a multiple of the sector size"));
        }

        let block_count = device.get_size() / block_size as u64;
        Ok(IO { device, block_size, block_count })
    }

    pub(crate) fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> Result<()> {
        if block.len() != self.block_size {
            return Err(FsError::device("block size mismatch"));
        }

        if index as u64 >= self.block_count {
            return Err(FsError::device("block index out of range"));
        }

        Ok(raw_write_block(&mut self.device, self.block_size, block, index as u64)?)
    }

    pub(crate) fn read_block(&self, index: BlockPointer) -> Result<Vec<u8>> {
        if index as u64 >= self.block_count {
            return Err(FsError::device("block index out of range"));
        }

        Ok(raw_read_block(&self.device, self.block_size, index as u64)?)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        Ok(self.device.flush()?)
    }

    pub(crate) fn into_device(self) -> A {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::MemoryDrive;
    use crate::util::error::FsError;

    #[test]
    fn read_write() {
        let drive = MemoryDrive::new(16 * 256, 256);
        let mut io = super::IO::new(drive, 256).unwrap();

        let block = vec![42; 256];
        io.write_block(0, &block).unwrap();
        assert_eq!(io.read_block(0).unwrap(), block);
        assert_eq!(io.block_count, 16);
    }

    #[test]
    fn read_write_large_block() {
        let drive = MemoryDrive::new(16 * 256, 64);
        let mut io = super::IO::new(drive.clone(), 256).unwrap();

        let block1 = vec![0x42; 256];
        io.write_block(3, &block1).unwrap();
        assert_eq!(io.read_block(3).unwrap(), block1);

        let block2 = vec![0x1; 256];
        io.write_block(4, &block2).unwrap();
        assert_eq!(io.read_block(4).unwrap(), block2);
        assert_eq!(io.read_block(3).unwrap(), block1);
        assert_eq!(drive.snapshot()[3 * 256..5 * 256], [vec![0x42; 256], vec![0x1; 256]].concat()[..]);
    }

    #[test]
    fn out_of_range_is_a_device_error() {
        let drive = MemoryDrive::new(4 * 256, 256);
        let mut io = super::IO::new(drive, 256).unwrap();
        assert!(matches!(io.read_block(4), Err(FsError::Device(_))));
        assert!(matches!(io.write_block(9, &vec![0; 256]), Err(FsError::Device(_))));
        assert!(matches!(io.write_block(1, &vec![0; 10]), Err(FsError::Device(_))));
    }

    #[test]
    fn rejects_incompatible_sectors() {
        assert!(super::IO::new(MemoryDrive::new(4 * 512, 512), 256).is_err());
        assert!(super::IO::new(MemoryDrive::new(4 * 96, 96), 256).is_err());
    }
}
