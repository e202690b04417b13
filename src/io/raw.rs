use std::io;

use log::trace;

use crate::driver::DeviceDriver;

pub(crate) fn raw_write_block<A: DeviceDriver>(drive: &mut A, block_size: usize, data: &[u8], index: u64) -> io::Result<()> {
    if block_size == drive.get_sector_size() {
        drive.write_sector(index, data)
    } else {
        let sector_size = drive.get_sector_size();
        let ratio = (block_size / sector_size) as u64;
        let start = index * ratio;

        for (i, sector) in data.chunks(sector_size).enumerate() {
            trace!("writing sector {} of block {}", start + i as u64, index);
            drive.write_sector(start + i as u64, sector)?;
        }
        Ok(())
    }
}

pub(crate) fn raw_read_block<A: DeviceDriver>(drive: &A, block_size: usize, index: u64) -> io::Result<Vec<u8>> {
    if block_size == drive.get_sector_size() {
        drive.read_sector(index)
    } else {
        let ratio = (block_size / drive.get_sector_size()) as u64;
        let mut buffer = Vec::with_capacity(block_size);

        let start = index * ratio;
        for i in start..start + ratio {
            trace!("reading sector {} of block {}", i, index);
            buffer.append(&mut drive.read_sector(i)?);
        }

        Ok(buffer)
    }
}
