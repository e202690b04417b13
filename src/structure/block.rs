use crate::consts::{BLOCK_SIZE, HEADER_SIZE, PAYLOAD_SIZE};
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

const TYPE_BYTE: usize = 0;
const SIZE_BYTE: usize = 1;

#[repr(u8)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum BlockType {
    Inode = 3,
    Data = 4,
    DirentName = 5,
    DirentNum = 6,
    FreeMask = 7,
}

impl BlockType {
    /// Inode class blocks carry a pointer list instead of file bytes.
    pub fn is_inode(&self) -> bool {
        *self != BlockType::Data
    }

    fn from_code(code: u8) -> Option<BlockType> {
        match code {
            3 => Some(BlockType::Inode),
            4 => Some(BlockType::Data),
            5 => Some(BlockType::DirentName),
            6 => Some(BlockType::DirentNum),
            7 => Some(BlockType::FreeMask),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Copy, Clone)]
pub struct BlockHeader {
    pub kind: BlockType,
    pub size: u8,
}

impl ByteSerializable for BlockHeader {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[TYPE_BYTE] = self.kind as u8;
        bytes[SIZE_BYTE] = self.size;
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FsError::format("truncated block header"));
        }
        let kind = BlockType::from_code(bytes[TYPE_BYTE])
            .ok_or_else(|| FsError::Format(format!("unknown block type {}", bytes[TYPE_BYTE])))?;
        let size = bytes[SIZE_BYTE];
        if size as usize > PAYLOAD_SIZE {
            return Err(FsError::Format(format!("block size field {} exceeds payload", size)));
        }
        Ok(BlockHeader { kind, size })
    }
}

impl KnownSize for BlockHeader {
    fn size_on_disk() -> usize {
        HEADER_SIZE
    }
}

/// Header followed by `payload`, zero padded to a full block.
pub fn encode_block(header: BlockHeader, payload: &[u8]) -> Vec<u8> {
    let mut block = header.to_bytes();
    block.extend_from_slice(&payload[..payload.len().min(PAYLOAD_SIZE)]);
    block.resize(BLOCK_SIZE, 0);
    block
}

pub fn decode_block(block: &[u8]) -> Result<(BlockHeader, &[u8])> {
    let header = BlockHeader::from_bytes(block)?;
    let payload = &block[HEADER_SIZE..];
    Ok((header, payload))
}

pub fn data_block(chunk: &[u8]) -> Vec<u8> {
    encode_block(BlockHeader { kind: BlockType::Data, size: chunk.len() as u8 }, chunk)
}
