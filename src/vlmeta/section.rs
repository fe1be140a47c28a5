//! Vlmeta Section Format
//!
//! The byte form of a vlmeta store, shared by frame trailers and the
//! sparse `vlmeta.b2` file.
//!
//! ## Section Format
//! ```text
//! ┌────────┬───────────┬──────────────────┬──────────────────┬──────────────┬──────────┐
//! │ "VLMT" │ Count (4B)│ Entries          │ Index            │ Index Off(4B)│ CRC32(4B)│
//! │        │           │ [klen u16][key]  │ [klen u16][key]  │              │          │
//! │        │           │ [clen u32][value]│ [offset u32]     │              │          │
//! └────────┴───────────┴──────────────────┴──────────────────┴──────────────┴──────────┘
//! ```
//!
//! - Entries and index are both in insertion order.
//! - Index offsets point at an entry's `klen`, relative to the section start.
//! - Values are compressed chunks.
//! - CRC covers every byte before it.
//!
//! An empty byte string decodes as an empty store; an empty store encodes
//! as an empty byte string.

use bytes::Bytes;

use crate::error::{Result, SChunkError};

const MAGIC: &[u8; 4] = b"VLMT";

/// Magic + count
const PREAMBLE_SIZE: usize = 8;

/// Index offset + CRC
const FOOTER_SIZE: usize = 8;

/// Encode `(key, compressed value)` pairs in the given order
pub(crate) fn encode(entries: &[(String, Bytes)]) -> Result<Vec<u8>> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    let mut offsets = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        offsets.push(to_u32(buf.len())?);
        buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&to_u32(value.len())?.to_le_bytes());
        buf.extend_from_slice(value);
    }

    let index_offset = to_u32(buf.len())?;
    for ((key, _), offset) in entries.iter().zip(&offsets) {
        buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
    }

    buf.extend_from_slice(&index_offset.to_le_bytes());
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Decode a section back into ordered `(key, compressed value)` pairs
pub(crate) fn decode(raw: &[u8]) -> Result<Vec<(String, Bytes)>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if raw.len() < PREAMBLE_SIZE + FOOTER_SIZE || &raw[0..4] != MAGIC {
        return Err(corrupt("missing section magic"));
    }

    let crc_pos = raw.len() - 4;
    let stored_crc = u32::from_le_bytes(raw[crc_pos..].try_into().unwrap());
    let actual_crc = crc32fast::hash(&raw[..crc_pos]);
    if stored_crc != actual_crc {
        return Err(SChunkError::CorruptData(format!(
            "vlmeta checksum mismatch: expected {:08x}, got {:08x}",
            stored_crc, actual_crc
        )));
    }

    let count = read_u32(raw, 4)? as usize;
    let index_offset = read_u32(raw, crc_pos - 4)? as usize;
    let index_end = crc_pos - 4;
    if index_offset < PREAMBLE_SIZE || index_offset > index_end {
        return Err(corrupt("index offset out of bounds"));
    }

    // Entries
    let body = &raw[..index_offset];
    let mut entries = Vec::with_capacity(count.min(body.len()));
    let mut offsets = Vec::with_capacity(entries.capacity());
    let mut pos = PREAMBLE_SIZE;
    for _ in 0..count {
        offsets.push(pos);
        let (key, next) = read_key(body, pos)?;
        let clen = read_u32(body, next)? as usize;
        let value = slice(body, next + 4, clen)?;
        entries.push((key, Bytes::copy_from_slice(value)));
        pos = next + 4 + clen;
    }
    if pos != index_offset {
        return Err(corrupt("entries do not end at the index"));
    }

    // Index must mirror the entries exactly
    let index = &raw[..index_end];
    let mut pos = index_offset;
    for ((key, _), expected) in entries.iter().zip(&offsets) {
        let (indexed_key, next) = read_key(index, pos)?;
        let offset = read_u32(index, next)? as usize;
        if indexed_key != *key || offset != *expected {
            return Err(SChunkError::CorruptData(format!(
                "vlmeta index disagrees with entry '{}'",
                key
            )));
        }
        pos = next + 4;
    }
    if pos != index_end {
        return Err(corrupt("trailing bytes after the index"));
    }

    Ok(entries)
}

// =============================================================================
// Helpers
// =============================================================================

fn corrupt(what: &str) -> SChunkError {
    SChunkError::CorruptData(format!("vlmeta section: {}", what))
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| {
        SChunkError::InvalidInput(format!("vlmeta section cannot exceed 4 GiB, got {} bytes", n))
    })
}

fn slice(buf: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    pos.checked_add(len)
        .and_then(|end| buf.get(pos..end))
        .ok_or_else(|| corrupt("truncated"))
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    let bytes = slice(buf, pos, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Read `[klen u16][key]`, returning the key and the position after it
fn read_key(buf: &[u8], pos: usize) -> Result<(String, usize)> {
    let len_bytes = slice(buf, pos, 2)?;
    let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let key = slice(buf, pos + 2, len)?;
    let key = String::from_utf8(key.to_vec()).map_err(|_| corrupt("key is not UTF-8"))?;
    Ok((key, pos + 2 + len))
}
