//! Block coding
//!
//! A chunk is split into blocks that are filtered and compressed
//! independently, optionally across several worker threads.
//!
//! ## Chunk Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (36 bytes)                                        │
//! ├──────────────────────────────────────────────────────────┤
//! │ [DictLen: u32][Dict]          (only with FLAG_DICT)      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Block starts: nblocks × u32 (offset from chunk start)    │
//! ├──────────────────────────────────────────────────────────┤
//! │ Block: [CLen: u32][Stream] × (1 or typesize if split)    │
//! │   (CLen == raw stream length means stored verbatim)      │
//! │ ... repeated for each block ...                          │
//! └──────────────────────────────────────────────────────────┘
//! ```

use tracing::{trace, warn};

use crate::error::{Result, SChunkError};
use crate::params::{CParams, Codec};

use super::backend::{compress_stream, decompress_stream, train_dictionary};
use super::filters::Pipeline;
use super::header::{ChunkHeader, FLAG_DICT, FLAG_MEMCPYED, FLAG_SPLIT};
use super::{HEADER_SIZE, MAX_BUFFERSIZE};

/// Blocks never go below this size unless the whole chunk is smaller
const MIN_BLOCKSIZE: usize = 128;

// =============================================================================
// Encoding
// =============================================================================

/// Compress `src` into a self-describing chunk
pub(crate) fn encode(src: &[u8], cparams: &CParams) -> Result<Vec<u8>> {
    if src.len() > MAX_BUFFERSIZE {
        return Err(SChunkError::InvalidParameter(format!(
            "input cannot be larger than {} bytes, got {}",
            MAX_BUFFERSIZE,
            src.len()
        )));
    }

    let nbytes = src.len();
    let blocksize = compute_blocksize(cparams, nbytes);

    let mut header = ChunkHeader {
        codec: cparams.codec,
        flags: 0,
        typesize: cparams.typesize,
        nbytes: nbytes as u32,
        blocksize: blocksize as u32,
        cbytes: 0,
        filters: cparams.filters,
        filters_meta: cparams.filters_meta,
        clevel: cparams.clevel,
        codec_meta: cparams.codec_meta,
        payload_crc: 0,
    };

    if cparams.clevel == 0 || nbytes == 0 {
        return Ok(memcpy_chunk(header, src));
    }

    let blocks: Vec<&[u8]> = src.chunks(blocksize).collect();
    let split = cparams.should_split();

    let dict = if cparams.use_dict && cparams.codec == Codec::Zstd && blocks.len() > 1 {
        let sizes: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
        match train_dictionary(src, &sizes) {
            Ok(dict) => Some(dict),
            Err(e) => {
                warn!(error = %e, "zstd dictionary training failed, compressing without one");
                None
            }
        }
    } else {
        None
    };

    let pipeline = Pipeline {
        filters: cparams.filters,
        meta: cparams.filters_meta,
        typesize: cparams.typesize as usize,
    };

    let encoded_blocks = run_parallel(cparams.nthreads, blocks, |block| {
        encode_block(block, cparams, &pipeline, split, dict.as_deref())
    })?;

    // Assemble: header, optional dict, block starts, blocks
    let dict_len = dict.as_ref().map(|d| 4 + d.len()).unwrap_or(0);
    let table_offset = HEADER_SIZE + dict_len;
    let data_offset = table_offset + 4 * encoded_blocks.len();
    let total = data_offset + encoded_blocks.iter().map(Vec::len).sum::<usize>();

    // Not worth it: store verbatim
    if total >= HEADER_SIZE + nbytes {
        trace!(nbytes, total, "chunk incompressible, storing verbatim");
        return Ok(memcpy_chunk(header, src));
    }

    let mut out = vec![0u8; HEADER_SIZE];
    out.reserve(total - HEADER_SIZE);
    if let Some(dict) = &dict {
        out.extend_from_slice(&(dict.len() as u32).to_le_bytes());
        out.extend_from_slice(dict);
        header.flags |= FLAG_DICT;
    }
    let mut start = data_offset;
    for block in &encoded_blocks {
        out.extend_from_slice(&(start as u32).to_le_bytes());
        start += block.len();
    }
    for block in &encoded_blocks {
        out.extend_from_slice(block);
    }

    if split {
        header.flags |= FLAG_SPLIT;
    }
    finish_header(&mut header, &mut out);
    Ok(out)
}

fn memcpy_chunk(mut header: ChunkHeader, src: &[u8]) -> Vec<u8> {
    header.flags = FLAG_MEMCPYED;
    let mut out = vec![0u8; HEADER_SIZE];
    out.extend_from_slice(src);
    finish_header(&mut header, &mut out);
    out
}

fn finish_header(header: &mut ChunkHeader, out: &mut [u8]) {
    header.cbytes = out.len() as u32;
    header.payload_crc = crc32fast::hash(&out[HEADER_SIZE..]);
    header.write_to(&mut out[..HEADER_SIZE]);
}

fn encode_block(
    block: &[u8],
    cparams: &CParams,
    pipeline: &Pipeline,
    split: bool,
    dict: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let filtered = pipeline.forward(block);
    let nstreams = stream_count(block.len(), cparams.typesize as usize, split);
    let stream_len = block.len() / nstreams;

    let mut out = Vec::with_capacity(block.len() / 2 + 4 * nstreams);
    for stream in filtered.chunks(stream_len) {
        let compressed = compress_stream(cparams.codec, cparams.clevel, dict, stream)?;
        if compressed.len() >= stream.len() {
            out.extend_from_slice(&(stream.len() as u32).to_le_bytes());
            out.extend_from_slice(stream);
        } else {
            out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            out.extend_from_slice(&compressed);
        }
    }
    Ok(out)
}

/// A block is split only when it divides evenly into `typesize` streams
fn stream_count(block_len: usize, typesize: usize, split: bool) -> usize {
    if split && typesize > 1 && block_len % typesize == 0 {
        typesize
    } else {
        1
    }
}

/// Pick the block size for a chunk of `nbytes`
pub(crate) fn compute_blocksize(cparams: &CParams, nbytes: usize) -> usize {
    if nbytes == 0 {
        return 0;
    }

    let requested = if cparams.blocksize > 0 {
        cparams.blocksize as usize
    } else {
        let base = match cparams.clevel {
            0 => nbytes,
            1..=3 => 32 * 1024,
            4..=6 => 64 * 1024,
            7 | 8 => 128 * 1024,
            _ => 256 * 1024,
        };
        if cparams.codec.is_high_ratio() {
            base * 2
        } else {
            base
        }
    };

    let typesize = cparams.typesize as usize;
    let mut blocksize = requested.max(MIN_BLOCKSIZE).min(nbytes);
    if blocksize > typesize {
        blocksize -= blocksize % typesize;
    }
    blocksize
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a chunk into `dst`, returning the number of bytes written
pub(crate) fn decode_into(src: &[u8], dst: &mut [u8], nthreads: u32) -> Result<usize> {
    let header = ChunkHeader::parse(src)?;
    header.check_buffer(src)?;

    let nbytes = header.nbytes as usize;
    if dst.len() < nbytes {
        return Err(SChunkError::InsufficientDestination {
            needed: nbytes,
            available: dst.len(),
        });
    }
    let dst = &mut dst[..nbytes];

    if header.is_memcpyed() || nbytes == 0 {
        let payload = &src[HEADER_SIZE..];
        if payload.len() != nbytes {
            return Err(SChunkError::CorruptData(format!(
                "verbatim chunk holds {} bytes, header claims {}",
                payload.len(),
                nbytes
            )));
        }
        dst.copy_from_slice(payload);
        return Ok(nbytes);
    }

    let mut pos = HEADER_SIZE;
    let dict = if header.has_dict() {
        let len = read_u32(src, pos)? as usize;
        pos += 4;
        let dict = slice(src, pos, len)?;
        pos += len;
        Some(dict)
    } else {
        None
    };

    let nblocks = header.nblocks();
    let mut starts = Vec::with_capacity(nblocks + 1);
    for i in 0..nblocks {
        starts.push(read_u32(src, pos + 4 * i)? as usize);
    }
    starts.push(src.len());
    let data_offset = pos + 4 * nblocks;
    for pair in starts.windows(2) {
        if pair[0] < data_offset || pair[0] > pair[1] {
            return Err(SChunkError::CorruptData(format!(
                "malformed block table entry {}",
                pair[0]
            )));
        }
    }

    let pipeline = Pipeline {
        filters: header.filters,
        meta: header.filters_meta,
        typesize: header.typesize as usize,
    };

    let work: Vec<(usize, &mut [u8])> = dst
        .chunks_mut(header.blocksize as usize)
        .enumerate()
        .collect();

    run_parallel(nthreads, work, |(i, out)| {
        decode_block(&src[starts[i]..starts[i + 1]], out, &header, &pipeline, dict)
    })?;

    Ok(nbytes)
}

fn decode_block(
    block: &[u8],
    out: &mut [u8],
    header: &ChunkHeader,
    pipeline: &Pipeline,
    dict: Option<&[u8]>,
) -> Result<()> {
    let nstreams = stream_count(out.len(), header.typesize as usize, header.is_split());
    let stream_len = out.len() / nstreams;

    let mut filtered = vec![0u8; out.len()];
    let mut pos = 0;
    for stream_out in filtered.chunks_mut(stream_len) {
        let clen = read_u32(block, pos)? as usize;
        pos += 4;
        let stream = slice(block, pos, clen)?;
        pos += clen;

        if clen == stream_out.len() {
            stream_out.copy_from_slice(stream);
        } else {
            decompress_stream(header.codec, dict, stream, stream_out)?;
        }
    }

    let restored = pipeline.backward(filtered);
    out.copy_from_slice(&restored);
    Ok(())
}

fn read_u32(src: &[u8], pos: usize) -> Result<u32> {
    let bytes = slice(src, pos, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn slice(src: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    src.get(pos..pos.saturating_add(len)).ok_or_else(|| {
        SChunkError::CorruptData(format!(
            "chunk truncated: need bytes {}..{}, have {}",
            pos,
            pos.saturating_add(len),
            src.len()
        ))
    })
}

// =============================================================================
// Worker threads
// =============================================================================

/// Run `f` over `items` on up to `nthreads` scoped threads, preserving order
fn run_parallel<I, T, F>(nthreads: u32, items: Vec<I>, f: F) -> Result<Vec<T>>
where
    I: Send,
    T: Send,
    F: Fn(I) -> Result<T> + Sync,
{
    let workers = (nthreads as usize).min(items.len());
    if workers <= 1 {
        return items.into_iter().map(f).collect();
    }

    let per_worker = (items.len() + workers - 1) / workers;
    let mut groups: Vec<Vec<I>> = Vec::with_capacity(workers);
    let mut iter = items.into_iter();
    loop {
        let group: Vec<I> = iter.by_ref().take(per_worker).collect();
        if group.is_empty() {
            break;
        }
        groups.push(group);
    }

    let f = &f;
    let results = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| scope.spawn(move |_| group.into_iter().map(f).collect::<Result<Vec<T>>>()))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect::<Vec<_>>()
    })
    .unwrap_or_else(|e| std::panic::resume_unwind(e));

    let mut out = Vec::new();
    for result in results {
        out.extend(result?);
    }
    Ok(out)
}
