//! Frame header encoding

use crate::error::{Result, SChunkError};
use crate::params::{CParams, CPARAMS_ENCODED_SIZE};

use super::{HEADER_SIZE, MAGIC, VERSION};

const CPARAMS_OFFSET: usize = 52;
const CRC_OFFSET: usize = 92;

/// Decoded frame header
#[derive(Debug, Clone, PartialEq)]
pub(super) struct FrameHeader {
    pub chunk_size: u32,
    pub nbytes: u64,
    pub nchunks: u64,
    pub trailer_offset: u64,
    pub vlmeta_len: u64,
    pub trailer_crc: u32,
    pub cparams: CParams,
}

impl FrameHeader {
    /// ```text
    /// 0  magic (4)          4  version u16      6  flags u16
    /// 8  chunk_size u32     12 reserved u32     16 nbytes u64
    /// 24 nchunks u64        32 trailer_off u64  40 vlmeta_len u64
    /// 48 trailer_crc u32    52 cparams (28)     80 reserved (12)
    /// 92 header_crc u32
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.nbytes.to_le_bytes());
        buf[24..32].copy_from_slice(&self.nchunks.to_le_bytes());
        buf[32..40].copy_from_slice(&self.trailer_offset.to_le_bytes());
        buf[40..48].copy_from_slice(&self.vlmeta_len.to_le_bytes());
        buf[48..52].copy_from_slice(&self.trailer_crc.to_le_bytes());
        buf[CPARAMS_OFFSET..CPARAMS_OFFSET + CPARAMS_ENCODED_SIZE]
            .copy_from_slice(&self.cparams.to_bytes());
        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(SChunkError::CorruptData(format!(
                "frame header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(SChunkError::CorruptData(format!(
                "invalid frame magic: expected SCFR, got {:?}",
                &buf[0..4]
            )));
        }

        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(SChunkError::CorruptData(format!(
                "unsupported frame version: {}",
                version
            )));
        }

        let stored_crc = u32::from_le_bytes(buf[CRC_OFFSET..CRC_OFFSET + 4].try_into().unwrap());
        let actual_crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        if stored_crc != actual_crc {
            return Err(SChunkError::CorruptData(format!(
                "frame header checksum mismatch: expected {:08x}, got {:08x}",
                stored_crc, actual_crc
            )));
        }

        Ok(Self {
            chunk_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            nbytes: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            nchunks: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            trailer_offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            vlmeta_len: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            trailer_crc: u32::from_le_bytes(buf[48..52].try_into().unwrap()),
            cparams: CParams::from_bytes(&buf[CPARAMS_OFFSET..CPARAMS_OFFSET + CPARAMS_ENCODED_SIZE])?,
        })
    }
}
