//! Super-chunk Module
//!
//! An ordered sequence of compressed chunks representing one logical buffer.
//!
//! ## Responsibilities
//! - Split appended data into `chunk_size` slices and compress each one
//! - Random-access decompression of any chunk
//! - Insert, update and delete chunks while keeping the size invariant
//! - Persist through the chosen storage layout, vlmeta included
//!
//! ## Chunk Size Invariant
//! ```text
//!   chunk 0        chunk 1        ...   chunk n-1
//! ┌──────────────┬──────────────┬─────┬─────────┐
//! │  chunk_size  │  chunk_size  │ ... │ <= size │
//! └──────────────┴──────────────┴─────┴─────────┘
//! ```
//! Every chunk but the last holds exactly `chunk_size` bytes. Once the last
//! chunk is shorter, the store is sealed for appends.
//!
//! ## Error Discipline
//! Every operation validates indices, sizes and parameters, and compresses
//! new data, before touching storage. In-memory bookkeeping only changes
//! after storage has accepted the mutation.

mod chunk;

pub use chunk::Chunk;

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::codec;
use crate::config::SChunkConfig;
use crate::error::{Result, SChunkError};
use crate::params::{CParams, DParams};
use crate::storage::{EncodedChunk, Opened, Storage, StorageMode, StoreMeta};
use crate::vlmeta::{VlMeta, VlMetaStore};

/// A chunked, compressed buffer with attached variable-length metadata
///
/// ## Concurrency:
/// - Reads take `&self`; mutations take `&mut self`
/// - Share across threads behind a lock if more than one writer exists
pub struct SChunk {
    chunk_size: u32,
    /// Sum of the uncompressed lengths of all chunks
    nbytes: u64,
    /// Sum of the compressed lengths of all chunks
    cbytes: u64,
    cparams: CParams,
    dparams: DParams,
    storage: Storage,
    vlmeta: VlMetaStore,
}

impl SChunk {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create an empty store
    pub fn new(config: SChunkConfig) -> Result<Self> {
        Self::from_data(config, &[])
    }

    /// Create a store pre-populated with `data`
    ///
    /// All of `data` is compressed before anything is written, so invalid
    /// parameters never leave a half-created path behind.
    pub fn from_data(config: SChunkConfig, data: &[u8]) -> Result<Self> {
        config.validate()?;

        let chunks = encode_slices(data, config.chunk_size, &config.cparams)?;
        let cbytes = chunks.iter().map(|c| c.cbytes() as u64).sum();

        let meta = StoreMeta {
            chunk_size: config.chunk_size,
            nbytes: data.len() as u64,
            cparams: config.cparams.clone(),
        };
        let storage = Storage::create(config.urlpath.as_deref(), config.contiguous, &meta, chunks)?;

        debug!(
            mode = ?storage.mode(),
            chunk_size = config.chunk_size,
            nchunks = storage.nchunks(),
            nbytes = data.len(),
            "created super-chunk"
        );

        Ok(Self {
            chunk_size: config.chunk_size,
            nbytes: data.len() as u64,
            cbytes,
            cparams: config.cparams,
            dparams: config.dparams,
            storage,
            vlmeta: VlMetaStore::default(),
        })
    }

    /// Reopen a persisted store with default decompression parameters
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DParams::default())
    }

    /// Reopen a persisted store
    ///
    /// A file is read as a contiguous frame, a directory as a sparse store.
    pub fn open_with(path: impl AsRef<Path>, dparams: DParams) -> Result<Self> {
        dparams.validate()?;
        let path = path.as_ref();

        let Opened {
            storage,
            meta,
            vlmeta_section,
        } = Storage::open(path)?;
        let vlmeta = VlMetaStore::from_section(&vlmeta_section)?;

        if meta.chunk_size == 0 {
            return Err(SChunkError::CorruptData("stored chunk_size is zero".to_string()));
        }

        // Recorded sizes must satisfy the chunk size invariant
        let nchunks = storage.nchunks();
        let mut nbytes = 0u64;
        let mut cbytes = 0u64;
        for i in 0..nchunks {
            let (chunk_nbytes, chunk_cbytes) = storage.chunk_sizes(i);
            let is_last = i + 1 == nchunks;
            if check_chunk_nbytes(chunk_nbytes, meta.chunk_size, is_last).is_err() {
                return Err(SChunkError::CorruptData(format!(
                    "chunk {} holds {} bytes with chunk_size {}",
                    i, chunk_nbytes, meta.chunk_size
                )));
            }
            nbytes += chunk_nbytes as u64;
            cbytes += chunk_cbytes as u64;
        }
        if nbytes != meta.nbytes {
            return Err(SChunkError::CorruptData(format!(
                "chunks hold {} bytes, store records {}",
                nbytes, meta.nbytes
            )));
        }

        info!(
            path = %path.display(),
            mode = ?storage.mode(),
            nchunks,
            nbytes,
            vlmeta_entries = vlmeta.len(),
            "opened super-chunk"
        );

        Ok(Self {
            chunk_size: meta.chunk_size,
            nbytes,
            cbytes,
            cparams: meta.cparams,
            dparams,
            storage,
            vlmeta,
        })
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Split `data` into chunks, compress and append them
    ///
    /// Returns the new chunk count.
    pub fn append_data(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(SChunkError::InvalidInput("cannot append empty data".to_string()));
        }
        self.check_not_sealed()?;

        let chunks = encode_slices(data, self.chunk_size, &self.cparams)?;
        let added_cbytes: u64 = chunks.iter().map(|c| c.cbytes() as u64).sum();
        let added_chunks = chunks.len();

        let meta = self.meta_with_nbytes(self.nbytes + data.len() as u64);
        self.storage.append(chunks, &meta)?;

        self.nbytes = meta.nbytes;
        self.cbytes += added_cbytes;
        trace!(added_chunks, nbytes = data.len(), "appended data");
        Ok(self.nchunks())
    }

    /// Append an already compressed chunk, e.g. one from `get_chunk`
    ///
    /// Returns the new chunk count.
    pub fn append_chunk(&mut self, compressed: &[u8]) -> Result<usize> {
        let chunk = self.prepare_chunk(compressed)?;
        self.check_not_sealed()?;
        check_chunk_nbytes(chunk.nbytes, self.chunk_size, true)?;

        let meta = self.meta_with_nbytes(self.nbytes + chunk.nbytes as u64);
        let cbytes = chunk.cbytes() as u64;
        self.storage.append(vec![chunk], &meta)?;

        self.nbytes = meta.nbytes;
        self.cbytes += cbytes;
        trace!(index = self.nchunks() - 1, "appended chunk");
        Ok(self.nchunks())
    }

    /// Insert an already compressed chunk at `index`
    ///
    /// `index == nchunks()` appends. Chunks after `index` shift up by one.
    pub fn insert_chunk(&mut self, index: usize, compressed: &[u8]) -> Result<usize> {
        let nchunks = self.nchunks();
        if index > nchunks {
            return Err(SChunkError::IndexOutOfRange { index, len: nchunks });
        }
        if index == nchunks {
            return self.append_chunk(compressed);
        }

        let chunk = self.prepare_chunk(compressed)?;
        check_chunk_nbytes(chunk.nbytes, self.chunk_size, false)?;

        let meta = self.meta_with_nbytes(self.nbytes + chunk.nbytes as u64);
        let cbytes = chunk.cbytes() as u64;
        self.storage.insert(index, chunk, &meta)?;

        self.nbytes = meta.nbytes;
        self.cbytes += cbytes;
        trace!(index, "inserted chunk");
        Ok(self.nchunks())
    }

    /// Replace the chunk at `index` with an already compressed one
    pub fn update_chunk(&mut self, index: usize, compressed: &[u8]) -> Result<usize> {
        self.check_index(index)?;
        let chunk = self.prepare_chunk(compressed)?;
        let is_last = index + 1 == self.nchunks();
        check_chunk_nbytes(chunk.nbytes, self.chunk_size, is_last)?;

        let (old_nbytes, old_cbytes) = self.storage.chunk_sizes(index);
        let meta = self.meta_with_nbytes(self.nbytes - old_nbytes as u64 + chunk.nbytes as u64);
        let cbytes = chunk.cbytes() as u64;
        self.storage.update(index, chunk, &meta)?;

        self.nbytes = meta.nbytes;
        self.cbytes = self.cbytes - old_cbytes as u64 + cbytes;
        trace!(index, "updated chunk");
        Ok(self.nchunks())
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Decompress the chunk at `index` into a new buffer
    pub fn decompress_chunk(&self, index: usize) -> Result<Vec<u8>> {
        self.check_index(index)?;
        let data = self.storage.read_chunk(index)?;
        codec::decompress2(&data, &self.dparams)
    }

    /// Decompress the chunk at `index` into `dst`
    ///
    /// Returns the number of bytes written. `dst` must hold at least the
    /// chunk's uncompressed length.
    pub fn decompress_chunk_into(&self, index: usize, dst: &mut [u8]) -> Result<usize> {
        self.check_index(index)?;
        let (nbytes, _) = self.storage.chunk_sizes(index);
        if dst.len() < nbytes as usize {
            return Err(SChunkError::InsufficientDestination {
                needed: nbytes as usize,
                available: dst.len(),
            });
        }
        let data = self.storage.read_chunk(index)?;
        codec::decompress2_into(&data, dst, &self.dparams)
    }

    /// Compressed bytes of the chunk at `index`, unmodified
    pub fn get_chunk(&self, index: usize) -> Result<Bytes> {
        self.check_index(index)?;
        self.storage.read_chunk(index)
    }

    /// The chunk at `index` together with its position and sizes
    pub fn chunk(&self, index: usize) -> Result<Chunk> {
        let data = self.get_chunk(index)?;
        let (nbytes, _) = self.storage.chunk_sizes(index);
        Ok(Chunk {
            index,
            data,
            nbytes,
            is_last: index + 1 == self.nchunks(),
        })
    }

    /// Decompress the whole store into one buffer
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.nbytes as usize];
        let mut pos = 0;
        for index in 0..self.nchunks() {
            pos += self.decompress_chunk_into(index, &mut out[pos..])?;
        }
        Ok(out)
    }

    // =========================================================================
    // Deleting & Maintenance
    // =========================================================================

    /// Remove the chunk at `index`; later chunks shift down by one
    ///
    /// Returns the new chunk count.
    pub fn delete_chunk(&mut self, index: usize) -> Result<usize> {
        self.check_index(index)?;

        let (nbytes, cbytes) = self.storage.chunk_sizes(index);
        let meta = self.meta_with_nbytes(self.nbytes - nbytes as u64);
        self.storage.delete(index, &meta)?;

        self.nbytes = meta.nbytes;
        self.cbytes -= cbytes as u64;
        trace!(index, nchunks = self.nchunks(), "deleted chunk");
        Ok(self.nchunks())
    }

    /// Reclaim space left behind by deleted or updated chunks
    ///
    /// Only contiguous frames accumulate dead space; elsewhere this is a
    /// no-op.
    pub fn compact(&mut self) -> Result<()> {
        let meta = self.store_meta();
        self.storage.compact(&meta)?;
        debug!(mode = ?self.storage.mode(), "compacted super-chunk");
        Ok(())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Read access to the vlmeta entries
    pub fn vlmeta(&self) -> &VlMetaStore {
        &self.vlmeta
    }

    /// Write access to the vlmeta entries; changes persist immediately
    pub fn vlmeta_mut(&mut self) -> VlMeta<'_> {
        let meta = self.store_meta();
        VlMeta::new(&mut self.vlmeta, &mut self.storage, meta)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn nchunks(&self) -> usize {
        self.storage.nchunks()
    }

    /// Total uncompressed length
    pub fn nbytes(&self) -> u64 {
        self.nbytes
    }

    /// Total compressed length of all chunks
    pub fn cbytes(&self) -> u64 {
        self.cbytes
    }

    /// `nbytes / cbytes`, or 0 for an empty store
    pub fn cratio(&self) -> f64 {
        if self.cbytes == 0 {
            0.0
        } else {
            self.nbytes as f64 / self.cbytes as f64
        }
    }

    pub fn cparams(&self) -> &CParams {
        &self.cparams
    }

    /// Replace the compression parameters for chunks appended from now on
    ///
    /// Existing chunks keep the parameters recorded in their headers.
    pub fn set_cparams(&mut self, cparams: CParams) -> Result<()> {
        cparams.validate()?;
        let meta = StoreMeta {
            cparams: cparams.clone(),
            ..self.store_meta()
        };
        self.storage.write_meta(&meta)?;
        self.cparams = cparams;
        Ok(())
    }

    pub fn dparams(&self) -> &DParams {
        &self.dparams
    }

    pub fn set_dparams(&mut self, dparams: DParams) -> Result<()> {
        dparams.validate()?;
        self.dparams = dparams;
        Ok(())
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage.mode()
    }

    pub fn urlpath(&self) -> Option<&Path> {
        self.storage.path()
    }

    pub fn contiguous(&self) -> bool {
        self.storage.mode() == StorageMode::Contiguous
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn store_meta(&self) -> StoreMeta {
        self.meta_with_nbytes(self.nbytes)
    }

    fn meta_with_nbytes(&self, nbytes: u64) -> StoreMeta {
        StoreMeta {
            chunk_size: self.chunk_size,
            nbytes,
            cparams: self.cparams.clone(),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.nchunks();
        if index >= len {
            return Err(SChunkError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    /// A short last chunk seals the store
    fn check_not_sealed(&self) -> Result<()> {
        let nchunks = self.nchunks();
        if nchunks == 0 {
            return Ok(());
        }
        let (last_nbytes, _) = self.storage.chunk_sizes(nchunks - 1);
        if last_nbytes < self.chunk_size {
            return Err(SChunkError::InvalidInput(format!(
                "last chunk holds {} of {} bytes; no more chunks can follow it",
                last_nbytes, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Validate a compressed chunk from the caller and take a copy of it
    fn prepare_chunk(&self, compressed: &[u8]) -> Result<EncodedChunk> {
        let sizes = codec::validate_chunk(compressed)?;
        Ok(EncodedChunk {
            data: Bytes::copy_from_slice(compressed),
            nbytes: sizes.nbytes,
        })
    }
}

impl fmt::Debug for SChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SChunk")
            .field("mode", &self.storage.mode())
            .field("urlpath", &self.storage.path())
            .field("chunk_size", &self.chunk_size)
            .field("nchunks", &self.nchunks())
            .field("nbytes", &self.nbytes)
            .field("cbytes", &self.cbytes)
            .field("vlmeta_entries", &self.vlmeta.len())
            .finish()
    }
}

/// Compress `data` in `chunk_size` slices
fn encode_slices(data: &[u8], chunk_size: u32, cparams: &CParams) -> Result<Vec<EncodedChunk>> {
    data.chunks(chunk_size as usize)
        .map(|slice| {
            Ok(EncodedChunk {
                data: Bytes::from(codec::compress2(slice, cparams)?),
                nbytes: slice.len() as u32,
            })
        })
        .collect()
}

/// Enforce the chunk size invariant for a chunk at a given position
fn check_chunk_nbytes(nbytes: u32, chunk_size: u32, is_last: bool) -> Result<()> {
    if nbytes == 0 {
        return Err(SChunkError::InvalidInput("chunk cannot be empty".to_string()));
    }
    if nbytes > chunk_size {
        return Err(SChunkError::InvalidInput(format!(
            "chunk holds {} bytes, more than chunk_size {}",
            nbytes, chunk_size
        )));
    }
    if !is_last && nbytes != chunk_size {
        return Err(SChunkError::InvalidInput(format!(
            "only the last chunk may hold fewer than {} bytes, got {}",
            chunk_size, nbytes
        )));
    }
    Ok(())
}
