//! Codec Module
//!
//! Turns a byte buffer into a self-describing compressed chunk and back.
//!
//! ## Responsibilities
//! - Validate compression parameters before touching data
//! - Split input into blocks and run the filter pipeline per block
//! - Dispatch each block to its compressor backend (LZ4, Zlib, Zstd)
//! - Detect corrupt or truncated chunks on the way back in
//!
//! Chunks produced here are what the super-chunk stores; they can also be
//! used standalone through `compress`/`decompress`.

mod backend;
mod blocks;
mod filters;
mod header;

use crate::error::{Result, SChunkError};
use crate::params::{CParams, Codec, DParams, Filter, MAX_FILTERS};

use header::ChunkHeader;

// =============================================================================
// Format Constants
// =============================================================================

/// Chunk format version written into every header
pub(crate) const FORMAT_VERSION: u8 = 1;

/// Chunk header size in bytes
pub const HEADER_SIZE: usize = 36;

/// Worst-case bytes a chunk adds on top of its input
pub const MAX_OVERHEAD: usize = HEADER_SIZE;

/// Largest buffer a single chunk can hold
pub const MAX_BUFFERSIZE: usize = i32::MAX as usize - MAX_OVERHEAD;

// =============================================================================
// Compression
// =============================================================================

/// Compress `src` with a single filter, the classic entry point
///
/// Unlike `compress2`, the input length must be a multiple of `typesize`.
pub fn compress(src: &[u8], typesize: u8, clevel: u8, filter: Filter, codec: Codec) -> Result<Vec<u8>> {
    let mut filters = [Filter::NoFilter; MAX_FILTERS];
    filters[MAX_FILTERS - 1] = filter;
    let cparams = CParams {
        codec,
        clevel,
        typesize,
        filters,
        ..CParams::default()
    };
    cparams.validate()?;

    if src.len() % typesize as usize != 0 {
        return Err(SChunkError::InvalidInput(format!(
            "len(src) can only be a multiple of typesize ({}), got {}",
            typesize,
            src.len()
        )));
    }

    blocks::encode(src, &cparams)
}

/// Compress `src` with a full parameter set
pub fn compress2(src: &[u8], cparams: &CParams) -> Result<Vec<u8>> {
    cparams.validate()?;
    blocks::encode(src, cparams)
}

// =============================================================================
// Decompression
// =============================================================================

/// Decompress a chunk into a new buffer sized exactly to its contents
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    decompress2(src, &DParams::default())
}

/// Decompress a chunk into `dst`, returning the number of bytes written
///
/// Fails with `InsufficientDestination` when `dst` is shorter than the
/// chunk's uncompressed length.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    decompress2_into(src, dst, &DParams::default())
}

/// Decompress a chunk into a new buffer using `dparams`
pub fn decompress2(src: &[u8], dparams: &DParams) -> Result<Vec<u8>> {
    dparams.validate()?;
    let header = ChunkHeader::parse(src)?;
    let mut dst = vec![0u8; header.nbytes as usize];
    blocks::decode_into(src, &mut dst, dparams.nthreads)?;
    Ok(dst)
}

/// Decompress a chunk into `dst` using `dparams`
pub fn decompress2_into(src: &[u8], dst: &mut [u8], dparams: &DParams) -> Result<usize> {
    dparams.validate()?;
    blocks::decode_into(src, dst, dparams.nthreads)
}

// =============================================================================
// Inspection
// =============================================================================

/// Sizes recorded in a chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizes {
    /// Uncompressed length
    pub nbytes: u32,
    /// Compressed length, header included
    pub cbytes: u32,
    pub blocksize: u32,
}

/// Read the sizes from a chunk header without decompressing
pub fn cbuffer_sizes(src: &[u8]) -> Result<ChunkSizes> {
    let header = ChunkHeader::parse(src)?;
    Ok(ChunkSizes {
        nbytes: header.nbytes,
        cbytes: header.cbytes,
        blocksize: header.blocksize,
    })
}

/// Name of the compression library that produced a chunk
pub fn get_clib(src: &[u8]) -> Result<&'static str> {
    Ok(ChunkHeader::parse(src)?.codec.lib_name())
}

/// Names of all available codecs
pub fn compressor_list() -> Vec<&'static str> {
    Codec::ALL.iter().map(|c| c.name()).collect()
}

/// Parse and fully validate a chunk, returning its sizes
pub(crate) fn validate_chunk(src: &[u8]) -> Result<ChunkSizes> {
    let header = ChunkHeader::parse(src)?;
    header.check_buffer(src)?;
    Ok(ChunkSizes {
        nbytes: header.nbytes,
        cbytes: header.cbytes,
        blocksize: header.blocksize,
    })
}
