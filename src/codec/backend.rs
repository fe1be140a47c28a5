//! Codec backends
//!
//! Thin dispatch over the compressor crates. Each call codes one stream of a
//! block; the stream framing lives in `blocks`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, SChunkError};
use crate::params::Codec;

/// Map a 1-9 level onto the zstd scale
fn zstd_level(clevel: u8) -> i32 {
    match clevel {
        9 => 19,
        level => (level as i32) * 2 - 1,
    }
}

/// Compress one stream
pub(crate) fn compress_stream(
    codec: Codec,
    clevel: u8,
    dict: Option<&[u8]>,
    src: &[u8],
) -> Result<Vec<u8>> {
    match codec {
        Codec::Lz4 | Codec::Lz4Hc => Ok(lz4_flex::block::compress(src)),
        Codec::Zlib => {
            let mut encoder =
                ZlibEncoder::new(Vec::with_capacity(src.len() / 2), Compression::new(clevel as u32));
            encoder.write_all(src)?;
            Ok(encoder.finish()?)
        }
        Codec::Zstd => match dict {
            Some(dict) => {
                let mut compressor =
                    zstd::bulk::Compressor::with_dictionary(zstd_level(clevel), dict)?;
                Ok(compressor.compress(src)?)
            }
            None => Ok(zstd::bulk::compress(src, zstd_level(clevel))?),
        },
    }
}

/// Decompress one stream into `dst`, which must be filled exactly
pub(crate) fn decompress_stream(
    codec: Codec,
    dict: Option<&[u8]>,
    src: &[u8],
    dst: &mut [u8],
) -> Result<()> {
    let written = match codec {
        Codec::Lz4 | Codec::Lz4Hc => lz4_flex::block::decompress_into(src, dst).map_err(|e| {
            SChunkError::CorruptData(format!("lz4 stream: {}", e))
        })?,
        Codec::Zlib => {
            let mut decoder = ZlibDecoder::new(src);
            decoder
                .read_exact(dst)
                .map_err(|e| SChunkError::CorruptData(format!("zlib stream: {}", e)))?;
            dst.len()
        }
        Codec::Zstd => {
            let result = match dict {
                Some(dict) => zstd::bulk::Decompressor::with_dictionary(dict)
                    .and_then(|mut d| d.decompress_to_buffer(src, dst)),
                None => zstd::bulk::decompress_to_buffer(src, dst),
            };
            result.map_err(|e| SChunkError::CorruptData(format!("zstd stream: {}", e)))?
        }
    };

    if written != dst.len() {
        return Err(SChunkError::CorruptData(format!(
            "{} stream decoded to {} bytes, expected {}",
            codec.name(),
            written,
            dst.len()
        )));
    }
    Ok(())
}

/// Train a zstd dictionary from the blocks of one chunk
pub(crate) fn train_dictionary(src: &[u8], block_sizes: &[usize]) -> Result<Vec<u8>> {
    let max_size = (src.len() / 20).clamp(256, 112_640);
    Ok(zstd::dict::from_continuous(src, block_sizes, max_size)?)
}
