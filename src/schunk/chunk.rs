//! A single chunk as handed out by `SChunk::chunk`

use bytes::Bytes;

/// One compressed chunk and its place in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the store, 0-based
    pub index: usize,
    /// Compressed bytes, header included
    pub data: Bytes,
    /// Uncompressed length
    pub nbytes: u32,
    pub is_last: bool,
}

impl Chunk {
    /// Compressed length
    pub fn cbytes(&self) -> usize {
        self.data.len()
    }

    /// Decompress this chunk on its own
    pub fn decompress(&self) -> crate::Result<Vec<u8>> {
        crate::codec::decompress(&self.data)
    }
}
