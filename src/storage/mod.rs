//! Storage Module
//!
//! Where the compressed chunks of a super-chunk live.
//!
//! ## Responsibilities
//! - Keep chunks in insertion order, addressable by index
//! - Persist chunks, store metadata and the vlmeta section
//! - Commit each mutation atomically from the caller's point of view
//!
//! ## Layouts
//! - **In-memory**: chunks live only as long as the store handle.
//! - **Contiguous frame**: one log-structured file (see `frame`).
//! - **Sparse directory**: one file per chunk plus a manifest (see `sparse`).
//!
//! Callers validate indices and chunk sizes before calling in here; the
//! backends only fail on I/O or on corrupt persisted data.

mod frame;
mod memory;
mod sparse;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SChunkError};
use crate::params::CParams;

pub(crate) use frame::FrameStorage;
pub(crate) use memory::MemoryStorage;
pub(crate) use sparse::SparseStorage;

/// How a store is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// No backing path
    InMemory,
    /// A single frame file
    Contiguous,
    /// A directory with one file per chunk
    Sparse,
}

/// Store-level metadata every persistent layout records
#[derive(Debug, Clone)]
pub(crate) struct StoreMeta {
    pub chunk_size: u32,
    pub nbytes: u64,
    pub cparams: CParams,
}

/// A compressed chunk together with its uncompressed length
#[derive(Debug, Clone)]
pub(crate) struct EncodedChunk {
    pub data: Bytes,
    pub nbytes: u32,
}

impl EncodedChunk {
    pub fn cbytes(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Location and sizes of one persisted chunk
///
/// `loc` is a file offset for frames and a chunk file id for sparse
/// directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChunkSlot {
    pub loc: u64,
    pub cbytes: u32,
    pub nbytes: u32,
}

/// Everything recovered when reopening a persisted store
pub(crate) struct Opened {
    pub storage: Storage,
    pub meta: StoreMeta,
    pub vlmeta_section: Vec<u8>,
}

/// Storage backend of a super-chunk
pub(crate) enum Storage {
    Memory(MemoryStorage),
    Frame(FrameStorage),
    Sparse(SparseStorage),
}

impl Storage {
    /// Create a new backend holding `chunks`
    ///
    /// `urlpath == None` always yields an in-memory store. Persistent
    /// layouts refuse to overwrite an existing path.
    pub fn create(
        urlpath: Option<&Path>,
        contiguous: bool,
        meta: &StoreMeta,
        chunks: Vec<EncodedChunk>,
    ) -> Result<Self> {
        match urlpath {
            None => Ok(Storage::Memory(MemoryStorage::new(chunks))),
            Some(path) if contiguous => Ok(Storage::Frame(FrameStorage::create(path, meta, &chunks)?)),
            Some(path) => Ok(Storage::Sparse(SparseStorage::create(path, meta, &chunks)?)),
        }
    }

    /// Reopen a persisted store: a file is a frame, a directory is sparse
    pub fn open(path: &Path) -> Result<Opened> {
        let metadata = fs::metadata(path)?;
        if metadata.is_dir() {
            let (storage, meta, vlmeta_section) = SparseStorage::open(path)?;
            Ok(Opened { storage: Storage::Sparse(storage), meta, vlmeta_section })
        } else {
            let (storage, meta, vlmeta_section) = FrameStorage::open(path)?;
            Ok(Opened { storage: Storage::Frame(storage), meta, vlmeta_section })
        }
    }

    pub fn mode(&self) -> StorageMode {
        match self {
            Storage::Memory(_) => StorageMode::InMemory,
            Storage::Frame(_) => StorageMode::Contiguous,
            Storage::Sparse(_) => StorageMode::Sparse,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Storage::Memory(_) => None,
            Storage::Frame(s) => Some(s.path()),
            Storage::Sparse(s) => Some(s.path()),
        }
    }

    pub fn nchunks(&self) -> usize {
        match self {
            Storage::Memory(s) => s.nchunks(),
            Storage::Frame(s) => s.nchunks(),
            Storage::Sparse(s) => s.nchunks(),
        }
    }

    /// (nbytes, cbytes) of the chunk at `index`; the index must be valid
    pub fn chunk_sizes(&self, index: usize) -> (u32, u32) {
        match self {
            Storage::Memory(s) => s.chunk_sizes(index),
            Storage::Frame(s) => s.chunk_sizes(index),
            Storage::Sparse(s) => s.chunk_sizes(index),
        }
    }

    pub fn read_chunk(&self, index: usize) -> Result<Bytes> {
        match self {
            Storage::Memory(s) => Ok(s.read_chunk(index)),
            Storage::Frame(s) => s.read_chunk(index),
            Storage::Sparse(s) => s.read_chunk(index),
        }
    }

    pub fn append(&mut self, chunks: Vec<EncodedChunk>, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Memory(s) => {
                s.append(chunks);
                Ok(())
            }
            Storage::Frame(s) => s.append(&chunks, meta),
            Storage::Sparse(s) => s.append(&chunks, meta),
        }
    }

    pub fn insert(&mut self, index: usize, chunk: EncodedChunk, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Memory(s) => {
                s.insert(index, chunk);
                Ok(())
            }
            Storage::Frame(s) => s.insert(index, &chunk, meta),
            Storage::Sparse(s) => s.insert(index, &chunk, meta),
        }
    }

    pub fn update(&mut self, index: usize, chunk: EncodedChunk, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Memory(s) => {
                s.update(index, chunk);
                Ok(())
            }
            Storage::Frame(s) => s.update(index, &chunk, meta),
            Storage::Sparse(s) => s.update(index, &chunk, meta),
        }
    }

    pub fn delete(&mut self, index: usize, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Memory(s) => {
                s.delete(index);
                Ok(())
            }
            Storage::Frame(s) => s.delete(index, meta),
            Storage::Sparse(s) => s.delete(index, meta),
        }
    }

    /// Persist a new vlmeta section
    pub fn write_vlmeta(&mut self, section: Vec<u8>, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Memory(_) => Ok(()),
            Storage::Frame(s) => s.write_vlmeta(section, meta),
            Storage::Sparse(s) => s.write_vlmeta(&section),
        }
    }

    /// Persist changed store metadata (e.g. new cparams)
    pub fn write_meta(&mut self, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Memory(_) => Ok(()),
            Storage::Frame(s) => s.write_header(meta),
            Storage::Sparse(s) => s.write_manifest(meta),
        }
    }

    /// Reclaim dead space; only frames accumulate any
    pub fn compact(&mut self, meta: &StoreMeta) -> Result<()> {
        match self {
            Storage::Frame(s) => s.compact(meta),
            Storage::Memory(_) | Storage::Sparse(_) => Ok(()),
        }
    }
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Permanently remove a file or a directory tree
///
/// A path that does not exist is not an error.
pub fn remove_urlpath(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SChunkError::Io(e)),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    debug!(path = %path.display(), "removed urlpath");
    Ok(())
}

/// Sibling path used while a file is being replaced
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `bytes`: write a temp file, sync it, rename it over
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
