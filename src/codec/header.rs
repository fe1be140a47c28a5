//! Chunk header
//!
//! Every chunk starts with a 36-byte little-endian header carrying enough
//! information to decode it without any outside context.

use crate::error::{Result, SChunkError};
use crate::params::{Codec, Filter, MAX_FILTERS};

use super::{FORMAT_VERSION, HEADER_SIZE, MAX_BUFFERSIZE};

/// Payload is the raw input, no blocks
pub(crate) const FLAG_MEMCPYED: u8 = 0x01;
/// Blocks are coded as one stream per byte of the type
pub(crate) const FLAG_SPLIT: u8 = 0x02;
/// A zstd dictionary precedes the block table
pub(crate) const FLAG_DICT: u8 = 0x04;

/// Decoded chunk header
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub codec: Codec,
    pub flags: u8,
    pub typesize: u8,
    /// Uncompressed length
    pub nbytes: u32,
    pub blocksize: u32,
    /// Total chunk length, header included
    pub cbytes: u32,
    pub filters: [Filter; MAX_FILTERS],
    pub filters_meta: [u8; MAX_FILTERS],
    pub clevel: u8,
    pub codec_meta: u8,
    /// CRC32 of every byte after the header
    pub payload_crc: u32,
}

impl ChunkHeader {
    /// Serialize into the first `HEADER_SIZE` bytes of `out`
    pub fn write_to(&self, out: &mut [u8]) {
        out[0] = FORMAT_VERSION;
        out[1] = self.codec as u8;
        out[2] = self.flags;
        out[3] = self.typesize;
        out[4..8].copy_from_slice(&self.nbytes.to_le_bytes());
        out[8..12].copy_from_slice(&self.blocksize.to_le_bytes());
        out[12..16].copy_from_slice(&self.cbytes.to_le_bytes());
        for (i, filter) in self.filters.iter().enumerate() {
            out[16 + i] = *filter as u8;
        }
        out[22..28].copy_from_slice(&self.filters_meta);
        out[28] = self.clevel;
        out[29] = self.codec_meta;
        out[30] = 0;
        out[31] = 0;
        out[32..36].copy_from_slice(&self.payload_crc.to_le_bytes());
    }

    /// Parse the header at the start of `src`
    ///
    /// Only the header itself is checked; use `check_buffer` before decoding.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(SChunkError::CorruptData(format!(
                "chunk shorter than its header: {} < {} bytes",
                src.len(),
                HEADER_SIZE
            )));
        }

        if src[0] != FORMAT_VERSION {
            return Err(SChunkError::CorruptData(format!(
                "unsupported chunk format version {}",
                src[0]
            )));
        }

        let corrupt = |e: SChunkError| SChunkError::CorruptData(e.to_string());

        let mut filters = [Filter::NoFilter; MAX_FILTERS];
        for (i, slot) in filters.iter_mut().enumerate() {
            *slot = Filter::try_from(src[16 + i]).map_err(corrupt)?;
        }
        let mut filters_meta = [0u8; MAX_FILTERS];
        filters_meta.copy_from_slice(&src[22..28]);

        let header = Self {
            codec: Codec::try_from(src[1]).map_err(corrupt)?,
            flags: src[2],
            typesize: src[3],
            nbytes: u32::from_le_bytes(src[4..8].try_into().unwrap()),
            blocksize: u32::from_le_bytes(src[8..12].try_into().unwrap()),
            cbytes: u32::from_le_bytes(src[12..16].try_into().unwrap()),
            filters,
            filters_meta,
            clevel: src[28],
            codec_meta: src[29],
            payload_crc: u32::from_le_bytes(src[32..36].try_into().unwrap()),
        };

        if header.typesize == 0 {
            return Err(SChunkError::CorruptData("chunk typesize is 0".to_string()));
        }
        if header.nbytes as usize > MAX_BUFFERSIZE {
            return Err(SChunkError::CorruptData(format!(
                "chunk claims {} uncompressed bytes (max {})",
                header.nbytes, MAX_BUFFERSIZE
            )));
        }
        if (header.cbytes as usize) < HEADER_SIZE {
            return Err(SChunkError::CorruptData(format!(
                "chunk claims {} compressed bytes, less than its header",
                header.cbytes
            )));
        }
        if !header.is_memcpyed() && header.nbytes > 0 && header.blocksize == 0 {
            return Err(SChunkError::CorruptData("chunk blocksize is 0".to_string()));
        }

        Ok(header)
    }

    /// Verify that `src` is exactly this chunk and its payload is intact
    pub fn check_buffer(&self, src: &[u8]) -> Result<()> {
        if self.cbytes as usize != src.len() {
            return Err(SChunkError::CorruptData(format!(
                "chunk header claims {} bytes but buffer holds {}",
                self.cbytes,
                src.len()
            )));
        }

        let actual = crc32fast::hash(&src[HEADER_SIZE..]);
        if actual != self.payload_crc {
            return Err(SChunkError::CorruptData(format!(
                "chunk checksum mismatch: expected {:08x}, got {:08x}",
                self.payload_crc, actual
            )));
        }

        Ok(())
    }

    pub fn is_memcpyed(&self) -> bool {
        self.flags & FLAG_MEMCPYED != 0
    }

    pub fn is_split(&self) -> bool {
        self.flags & FLAG_SPLIT != 0
    }

    pub fn has_dict(&self) -> bool {
        self.flags & FLAG_DICT != 0
    }

    /// Number of blocks (0 for memcpyed or empty chunks)
    pub fn nblocks(&self) -> usize {
        if self.is_memcpyed() || self.nbytes == 0 {
            return 0;
        }
        let nbytes = self.nbytes as usize;
        let blocksize = self.blocksize as usize;
        (nbytes + blocksize - 1) / blocksize
    }
}
