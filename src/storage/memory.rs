//! In-memory storage

use bytes::Bytes;

use super::EncodedChunk;

/// Chunks held in process memory only
pub(crate) struct MemoryStorage {
    chunks: Vec<EncodedChunk>,
}

impl MemoryStorage {
    pub fn new(chunks: Vec<EncodedChunk>) -> Self {
        Self { chunks }
    }

    pub fn nchunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_sizes(&self, index: usize) -> (u32, u32) {
        let chunk = &self.chunks[index];
        (chunk.nbytes, chunk.cbytes())
    }

    /// Cheap: clones the `Bytes` handle, not the data
    pub fn read_chunk(&self, index: usize) -> Bytes {
        self.chunks[index].data.clone()
    }

    pub fn append(&mut self, chunks: Vec<EncodedChunk>) {
        self.chunks.extend(chunks);
    }

    pub fn insert(&mut self, index: usize, chunk: EncodedChunk) {
        self.chunks.insert(index, chunk);
    }

    pub fn update(&mut self, index: usize, chunk: EncodedChunk) {
        self.chunks[index] = chunk;
    }

    pub fn delete(&mut self, index: usize) {
        self.chunks.remove(index);
    }
}
