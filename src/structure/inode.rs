use crate::consts::{BlockPointer, MAX_FILE_SIZE, MAX_POINTERS, PAYLOAD_SIZE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::block::{data_block, decode_block, encode_block, BlockHeader, BlockType};
use crate::structure::Structure;
use crate::util::error::{FsError, Result};

/// An inode block: a typed header followed by the pointers of the data
/// blocks it owns. There is a single level of indirection only.
#[derive(Debug, PartialEq, Clone)]
pub struct Inode {
    pub(crate) id: BlockPointer,
    pub(crate) kind: BlockType,
    pub(crate) pointers: Vec<BlockPointer>,
}

impl Inode {
    /// Claims a block according to the volume's policy for `kind` and writes
    /// a new inode owning `pointers` into it.
    pub fn create<A: DeviceDriver>(
        structure: &mut Structure<A>,
        pointers: Vec<BlockPointer>,
        kind: BlockType,
    ) -> Result<Inode> {
        if !kind.is_inode() || pointers.len() > MAX_POINTERS {
            return Err(FsError::format("invalid inode layout"));
        }

        let direction = structure.policy.direction_for(kind);
        let id = structure.block_map.claim(direction)?;
        let inode = Inode { id, kind, pointers };

        if let Err(error) = inode.write(&mut structure.io) {
            structure.block_map.release(id)?;
            return Err(error);
        }
        Ok(inode)
    }

    pub fn read<A: DeviceDriver>(io: &IO<A>, id: BlockPointer) -> Result<Inode> {
        let block = io.read_block(id)?;
        let (header, payload) = decode_block(&block)?;

        if !header.kind.is_inode() {
            return Err(FsError::Format(format!("block {} is not an inode", id)));
        }

        Ok(Inode { id, kind: header.kind, pointers: payload[..header.size as usize].to_vec() })
    }

    fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let header = BlockHeader { kind: self.kind, size: self.pointers.len() as u8 };
        io.write_block(self.id, &encode_block(header, &self.pointers))
    }

    /// Rewrites the pointer list in place.
    pub fn update<A: DeviceDriver>(&mut self, io: &mut IO<A>, pointers: Vec<BlockPointer>) -> Result<()> {
        let previous = std::mem::replace(&mut self.pointers, pointers);
        if let Err(error) = self.write(io) {
            self.pointers = previous;
            return Err(error);
        }
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.pointers.len()
    }

    /// Length of the content in bytes, same as `read_all(io)?.len()`.
    pub fn size<A: DeviceDriver>(&self, io: &IO<A>) -> Result<u64> {
        match self.pointers.last() {
            None => Ok(0),
            Some(last) => {
                let full = (self.pointers.len() - 1) * PAYLOAD_SIZE;
                Ok((full + Inode::read_data(io, *last)?.len()) as u64)
            }
        }
    }

    fn read_data<A: DeviceDriver>(io: &IO<A>, pointer: BlockPointer) -> Result<Vec<u8>> {
        let block = io.read_block(pointer)?;
        let (header, payload) = decode_block(&block)?;

        if header.kind != BlockType::Data {
            return Err(FsError::Format(format!("block {} is not a data block", pointer)));
        }

        Ok(payload[..header.size as usize].to_vec())
    }

    pub fn read_all<A: DeviceDriver>(&self, io: &IO<A>) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        for pointer in &self.pointers {
            result.append(&mut Inode::read_data(io, *pointer)?);
        }
        Ok(result)
    }

    /// Reads up to `len` bytes starting at `offset`. Only the blocks covering
    /// the range are touched, which relies on every chunk but the last one
    /// being full.
    pub fn read_at<A: DeviceDriver>(&self, io: &IO<A>, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut result = Vec::with_capacity(len);
        let mut index = offset / PAYLOAD_SIZE;
        let mut skip = offset % PAYLOAD_SIZE;

        while result.len() < len && index < self.pointers.len() {
            let chunk = Inode::read_data(io, self.pointers[index])?;
            if skip < chunk.len() {
                let take = (len - result.len()).min(chunk.len() - skip);
                result.extend_from_slice(&chunk[skip..skip + take]);
            }
            skip = 0;
            index += 1;
        }

        Ok(result)
    }

    /// Bookkeeping inodes always own at least one, possibly empty, data
    /// block so the volume's fixed overhead does not change across syncs.
    fn keeps_a_block(&self) -> bool {
        self.kind != BlockType::Inode
    }

    /// Blocks `write_all` would have to claim to store `len` bytes, and blocks
    /// it would hand back.
    pub(crate) fn chain_delta(&self, len: usize) -> (usize, usize) {
        let mut chunks = len.div_ceil(PAYLOAD_SIZE);
        if chunks == 0 && self.keeps_a_block() {
            chunks = 1;
        }
        (chunks.saturating_sub(self.pointers.len()), self.pointers.len().saturating_sub(chunks))
    }

    /// Replaces the whole content of the inode with `data`.
    ///
    /// Blocks already in the chain are reused front to back, missing ones are
    /// claimed and surplus ones are released before the inode is rewritten.
    /// Space is checked up front, so `NoFreeBlock` and `FileTooLarge` leave
    /// the volume untouched.
    pub fn write_all<A: DeviceDriver>(&mut self, structure: &mut Structure<A>, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge { size: data.len(), max: MAX_FILE_SIZE });
        }

        let mut chunks: Vec<&[u8]> = data.chunks(PAYLOAD_SIZE).collect();
        if chunks.is_empty() && self.keeps_a_block() {
            chunks.push(&[]);
        }
        let reused = chunks.len().min(self.pointers.len());
        let needed = chunks.len() - reused;

        if structure.block_map.free_count() < needed as u64 {
            return Err(FsError::NoFreeBlock);
        }

        let direction = structure.policy.direction_for(self.kind);
        let mut claimed = Vec::with_capacity(needed);
        for _ in 0..needed {
            match structure.block_map.claim(direction) {
                Ok(pointer) => claimed.push(pointer),
                Err(error) => {
                    Inode::roll_back(structure, &claimed, &[]);
                    return Err(error);
                }
            }
        }

        let mut pointers = self.pointers[..reused].to_vec();
        pointers.extend_from_slice(&claimed);

        for (pointer, chunk) in pointers.iter().zip(chunks.iter()) {
            if let Err(error) = structure.io.write_block(*pointer, &data_block(chunk)) {
                Inode::roll_back(structure, &claimed, &[]);
                return Err(error);
            }
        }

        let surplus = self.pointers[reused..].to_vec();
        for pointer in &surplus {
            structure.block_map.release(*pointer)?;
        }

        if let Err(error) = self.update(&mut structure.io, pointers) {
            Inode::roll_back(structure, &claimed, &surplus);
            return Err(error);
        }
        Ok(())
    }

    /// Returns every data block and the inode block itself to the free pool.
    pub fn release_all<A: DeviceDriver>(self, structure: &mut Structure<A>) -> Result<()> {
        for pointer in &self.pointers {
            structure.block_map.release(*pointer)?;
        }
        structure.block_map.release(self.id)
    }

    fn roll_back<A: DeviceDriver>(structure: &mut Structure<A>, claimed: &[BlockPointer], released: &[BlockPointer]) {
        for pointer in claimed {
            let _ = structure.block_map.release(*pointer);
        }
        for pointer in released {
            structure.block_map.mark_used(*pointer);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::{BlockPointer, MAX_FILE_SIZE, PAYLOAD_SIZE};
    use crate::driver::MemoryDrive;
    use crate::structure::block::BlockType;
    use crate::structure::blockmap::ClaimPolicy;
    use crate::structure::inode::Inode;
    use crate::structure::Structure;
    use crate::util::error::FsError;

    fn structure(blocks: u64) -> (MemoryDrive, Structure<MemoryDrive>) {
        let drive = MemoryDrive::new(blocks * 256, 256);
        let device = Structure::format(drive.clone(), ClaimPolicy::Split).unwrap();
        (drive, Structure::mount(device, ClaimPolicy::Split).unwrap())
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn create_claims_from_the_top() {
        let (_, mut structure) = structure(40);
        let inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        assert_eq!(inode.id, 39);
        assert_eq!(Inode::read(&structure.io, 39).unwrap(), inode);
    }

    #[test]
    fn update_in_place() {
        let (_, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        inode.update(&mut structure.io, vec![10, 11, 12]).unwrap();
        let block = structure.io.read_block(inode.id).unwrap();
        assert_eq!(&block[..11], &[3, 3, 0, 0, 0, 0, 0, 0, 10, 11, 12]);
    }

    #[test]
    fn read_write_data() {
        let (_, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        for len in [0, 1, PAYLOAD_SIZE - 1, PAYLOAD_SIZE, PAYLOAD_SIZE + 1, 1000] {
            let data = pattern(len);
            inode.write_all(&mut structure, &data).unwrap();
            assert_eq!(inode.read_all(&structure.io).unwrap(), data);
            assert_eq!(inode.size(&structure.io).unwrap(), len as u64);
            assert_eq!(inode.block_count(), (len + PAYLOAD_SIZE - 1) / PAYLOAD_SIZE);
        }
    }

    #[test]
    fn read_at_spans_blocks() {
        let (_, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        let data = pattern(600);
        inode.write_all(&mut structure, &data).unwrap();

        assert_eq!(inode.read_at(&structure.io, 0, 10).unwrap(), data[..10]);
        assert_eq!(inode.read_at(&structure.io, 240, 20).unwrap(), data[240..260]);
        assert_eq!(inode.read_at(&structure.io, 590, 50).unwrap(), data[590..]);
        assert!(inode.read_at(&structure.io, 600, 1).unwrap().is_empty());
    }

    #[test]
    fn shrinking_releases_the_tail() {
        let (_, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        let baseline = structure.block_map.used_count();

        inode.write_all(&mut structure, &pattern(5 * PAYLOAD_SIZE)).unwrap();
        assert_eq!(structure.block_map.used_count(), baseline + 5);
        let tail: Vec<BlockPointer> = inode.pointers[2..].to_vec();

        inode.write_all(&mut structure, &pattern(2 * PAYLOAD_SIZE)).unwrap();
        assert_eq!(structure.block_map.used_count(), baseline + 2);
        for pointer in tail {
            assert!(structure.block_map.is_free(pointer as u64));
        }

        inode.write_all(&mut structure, &[]).unwrap();
        assert_eq!(structure.block_map.used_count(), baseline);
    }

    #[test]
    fn growth_without_space_changes_nothing() {
        let (drive, mut structure) = structure(12);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        inode.write_all(&mut structure, &pattern(10)).unwrap();
        let free = structure.block_map.free_count();
        let before = drive.snapshot();

        let result = inode.write_all(&mut structure, &pattern((free as usize + 2) * PAYLOAD_SIZE));
        assert!(matches!(result, Err(FsError::NoFreeBlock)));
        assert_eq!(structure.block_map.free_count(), free);
        assert_eq!(drive.snapshot(), before);
        assert_eq!(inode.read_all(&structure.io).unwrap(), pattern(10));
    }

    #[test]
    fn too_large() {
        let (_, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        let result = inode.write_all(&mut structure, &vec![0; MAX_FILE_SIZE + 1]);
        assert!(matches!(result, Err(FsError::FileTooLarge { .. })));
    }

    #[test]
    fn device_failure_rolls_back_claims() {
        let (drive, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        let used = structure.block_map.used_count();

        drive.fail_writes(true);
        let result = inode.write_all(&mut structure, &pattern(700));
        drive.fail_writes(false);

        assert!(matches!(result, Err(FsError::Device(_))));
        assert_eq!(structure.block_map.used_count(), used);
        assert!(inode.pointers.is_empty());
    }

    #[test]
    fn release_all_frees_everything() {
        let (_, mut structure) = structure(40);
        let baseline = structure.block_map.used_count();
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        inode.write_all(&mut structure, &pattern(900)).unwrap();
        inode.release_all(&mut structure).unwrap();
        assert_eq!(structure.block_map.used_count(), baseline);
    }

    #[test]
    fn data_blocks_are_not_inodes() {
        let (_, mut structure) = structure(40);
        let mut inode = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        inode.write_all(&mut structure, b"abc").unwrap();
        assert!(matches!(Inode::read(&structure.io, inode.pointers[0]), Err(FsError::Format(_))));
    }

    #[test]
    fn bookkeeping_inodes_keep_one_block() {
        let (_, mut structure) = structure(40);
        let mut names = Inode::read(&structure.io, structure.superblock.dir_names).unwrap();
        let baseline = structure.block_map.used_count();

        names.write_all(&mut structure, &pattern(PAYLOAD_SIZE + 1)).unwrap();
        assert_eq!(structure.block_map.used_count(), baseline + 1);
        names.write_all(&mut structure, &[]).unwrap();
        assert_eq!(names.block_count(), 1);
        assert_eq!(structure.block_map.used_count(), baseline);
        assert!(names.read_all(&structure.io).unwrap().is_empty());

        assert_eq!(names.chain_delta(0), (0, 0));
        assert_eq!(names.chain_delta(3 * PAYLOAD_SIZE), (2, 0));
        let file = Inode::create(&mut structure, vec![], BlockType::Inode).unwrap();
        assert_eq!(file.chain_delta(0), (0, 0));
        assert_eq!(file.chain_delta(1), (1, 0));
    }
}
