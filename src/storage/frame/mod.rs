//! Contiguous Frame
//!
//! A whole super-chunk in a single file, laid out as an append-only log.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (96 bytes, rewritten in place on every commit)       │
//! │   Magic "SCFR" | Version | ChunkSize | NBytes | NChunks |   │
//! │   TrailerOffset | VlMetaLen | TrailerCRC | CParams | CRC    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Chunk records (append-only)                                 │
//! │   [CBytes: u32][NBytes: u32][Chunk]                         │
//! │   ... live records, dead records, stale trailers ...       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Trailer (at TrailerOffset)                                  │
//! │   Chunk index: NChunks × [Offset u64][CBytes u32][NBytes u32]│
//! │   VlMeta section (VlMetaLen bytes)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Commit Protocol
//! 1. Append new chunk records at the end of the file
//! 2. Append a fresh trailer describing the new chunk order
//! 3. fsync
//! 4. Rewrite the header to point at the new trailer, fsync
//!
//! Until step 4 the previous header still describes a consistent frame.
//! Deleting a chunk only drops it from the next trailer; its record stays
//! behind as dead space, as do replaced records and stale trailers.
//!
//! ## Compaction
//! After any commit whose dead space exceeds the live records plus the
//! current trailer, the live records are copied to `<path>.tmp`, which is
//! renamed over the frame. A failed automatic compaction is logged and
//! leaves the committed frame untouched; `compact` runs it on demand.

mod header;
mod file;

pub(crate) use file::FrameStorage;

/// Magic bytes identifying a frame file
pub(crate) const MAGIC: &[u8; 4] = b"SCFR";

/// Current frame format version
pub(crate) const VERSION: u16 = 1;

/// Fixed header size
pub(crate) const HEADER_SIZE: u64 = 96;

/// Per-record prefix: CBytes (4) + NBytes (4)
pub(crate) const RECORD_HEADER_SIZE: u64 = 8;

/// Per-chunk entry in the trailer index: Offset (8) + CBytes (4) + NBytes (4)
pub(crate) const INDEX_ENTRY_SIZE: u64 = 16;
