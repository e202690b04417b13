use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use crate::driver::{check_sector, DeviceDriver};

/// RAM disk. Clones share the same sectors, so a volume can be formatted,
/// dropped and mounted again through another handle.
#[derive(Clone)]
pub struct MemoryDrive {
    data: Rc<RefCell<Vec<u8>>>,
    sector_size: usize,
    fail_reads: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryDrive {
    pub fn new(bytes: u64, sector_size: usize) -> MemoryDrive {
        MemoryDrive {
            data: Rc::new(RefCell::new(vec![0; bytes as usize])),
            sector_size,
            fail_reads: Rc::new(Cell::new(false)),
            fail_writes: Rc::new(Cell::new(false)),
        }
    }

    /// Makes every following read fail until switched off again.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    fn injected(kind: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("injected {} failure", kind))
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.borrow().len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        if self.fail_reads.get() {
            return Err(MemoryDrive::injected("read"));
        }
        check_sector(index, self.get_sector_count())?;
        let offset = index as usize * self.sector_size;
        Ok(self.data.borrow()[offset..offset + self.sector_size].to_vec())
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        if self.fail_writes.get() {
            return Err(MemoryDrive::injected("write"));
        }
        check_sector(index, self.get_sector_count())?;
        if data.len() != self.sector_size {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "sector size mismatch"));
        }
        let offset = index as usize * self.sector_size;
        self.data.borrow_mut()[offset..offset + self.sector_size].copy_from_slice(data);
        Ok(())
    }
}
