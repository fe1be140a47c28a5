//! Sparse Directory
//!
//! A super-chunk spread over a directory, one file per chunk.
//!
//! ## Layout
//! ```text
//! {urlpath}/
//!   ├── index.b2            (manifest: Magic | CRC32 | bincode SparseManifest)
//!   ├── vlmeta.b2           (vlmeta section, absent while empty)
//!   └── chunks/
//!         ├── 00000000.chunk
//!         ├── 00000001.chunk
//!         └── ...
//! ```
//!
//! The manifest lists chunk file ids in logical order. Chunk files are
//! written before the manifest that references them and removed only after
//! the manifest that drops them is in place, so a crash leaves at worst an
//! orphaned file, never a dangling reference.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Result, SChunkError};
use crate::params::CParams;

use super::{write_atomic, ChunkSlot, EncodedChunk, StoreMeta};

const MANIFEST_FILENAME: &str = "index.b2";
const VLMETA_FILENAME: &str = "vlmeta.b2";
const CHUNK_DIR: &str = "chunks";

/// Magic bytes identifying a sparse manifest
const MAGIC: &[u8; 4] = b"SCSP";

/// Current manifest version
const VERSION: u16 = 1;

/// Serialized manifest
#[derive(Debug, Serialize, Deserialize)]
struct SparseManifest {
    version: u16,
    chunk_size: u32,
    nbytes: u64,
    cparams: CParams,
    /// Chunks in logical order; `loc` is the chunk file id
    chunks: Vec<ChunkSlot>,
    next_id: u64,
}

/// A super-chunk persisted as a directory of chunk files
pub(crate) struct SparseStorage {
    dir: PathBuf,
    slots: Vec<ChunkSlot>,
    next_id: u64,
}

impl SparseStorage {
    /// Create the directory layout; fails if `dir` already exists
    pub fn create(dir: &Path, meta: &StoreMeta, chunks: &[EncodedChunk]) -> Result<Self> {
        if let Some(parent) = dir.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::create_dir(dir)?;

        let mut storage = Self {
            dir: dir.to_path_buf(),
            slots: Vec::new(),
            next_id: 0,
        };

        let result = fs::create_dir(storage.chunk_dir())
            .map_err(SChunkError::from)
            .and_then(|_| storage.append(chunks, meta));
        if let Err(e) = result {
            let _ = fs::remove_dir_all(dir);
            return Err(e);
        }

        debug!(path = %dir.display(), nchunks = chunks.len(), "created sparse store");
        Ok(storage)
    }

    /// Open an existing directory layout
    pub fn open(dir: &Path) -> Result<(Self, StoreMeta, Vec<u8>)> {
        let raw = fs::read(dir.join(MANIFEST_FILENAME))?;
        let manifest = decode_manifest(&raw)?;

        let vlmeta = match fs::read(dir.join(VLMETA_FILENAME)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(SChunkError::Io(e)),
        };

        let meta = StoreMeta {
            chunk_size: manifest.chunk_size,
            nbytes: manifest.nbytes,
            cparams: manifest.cparams,
        };

        debug!(
            path = %dir.display(),
            nchunks = manifest.chunks.len(),
            nbytes = meta.nbytes,
            "opened sparse store"
        );

        let storage = Self {
            dir: dir.to_path_buf(),
            slots: manifest.chunks,
            next_id: manifest.next_id,
        };
        Ok((storage, meta, vlmeta))
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn nchunks(&self) -> usize {
        self.slots.len()
    }

    pub fn chunk_sizes(&self, index: usize) -> (u32, u32) {
        let slot = &self.slots[index];
        (slot.nbytes, slot.cbytes)
    }

    pub fn read_chunk(&self, index: usize) -> Result<Bytes> {
        let slot = self.slots[index];
        let data = fs::read(self.chunk_path(slot.loc))?;
        if data.len() != slot.cbytes as usize {
            return Err(SChunkError::CorruptData(format!(
                "chunk file {} holds {} bytes, manifest says {}",
                slot.loc,
                data.len(),
                slot.cbytes
            )));
        }
        Ok(Bytes::from(data))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn append(&mut self, chunks: &[EncodedChunk], meta: &StoreMeta) -> Result<()> {
        let new_slots = self.write_chunk_files(chunks)?;
        let mut slots = self.slots.clone();
        slots.extend(new_slots.iter().copied());
        self.commit(slots, self.next_id + new_slots.len() as u64, meta, &new_slots, &[])
    }

    pub fn insert(&mut self, index: usize, chunk: &EncodedChunk, meta: &StoreMeta) -> Result<()> {
        let new_slots = self.write_chunk_files(std::slice::from_ref(chunk))?;
        let mut slots = self.slots.clone();
        slots.insert(index, new_slots[0]);
        self.commit(slots, self.next_id + 1, meta, &new_slots, &[])
    }

    pub fn update(&mut self, index: usize, chunk: &EncodedChunk, meta: &StoreMeta) -> Result<()> {
        let new_slots = self.write_chunk_files(std::slice::from_ref(chunk))?;
        let mut slots = self.slots.clone();
        let old = std::mem::replace(&mut slots[index], new_slots[0]);
        self.commit(slots, self.next_id + 1, meta, &new_slots, &[old])
    }

    /// Only the deleted chunk's file is touched, besides the manifest
    pub fn delete(&mut self, index: usize, meta: &StoreMeta) -> Result<()> {
        let mut slots = self.slots.clone();
        let old = slots.remove(index);
        self.commit(slots, self.next_id, meta, &[], &[old])
    }

    pub fn write_vlmeta(&mut self, section: &[u8]) -> Result<()> {
        write_atomic(&self.dir.join(VLMETA_FILENAME), section)
    }

    pub fn write_manifest(&mut self, meta: &StoreMeta) -> Result<()> {
        let raw = encode_manifest(&self.manifest_for(self.slots.clone(), self.next_id, meta))?;
        write_atomic(&self.dir.join(MANIFEST_FILENAME), &raw)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn chunk_dir(&self) -> PathBuf {
        self.dir.join(CHUNK_DIR)
    }

    /// "chunks/00000042.chunk" for id 42
    fn chunk_path(&self, id: u64) -> PathBuf {
        self.chunk_dir().join(format!("{:08}.chunk", id))
    }

    /// Write chunk files under fresh ids; nothing references them yet
    fn write_chunk_files(&self, chunks: &[EncodedChunk]) -> Result<Vec<ChunkSlot>> {
        let mut written = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let slot = ChunkSlot {
                loc: self.next_id + i as u64,
                cbytes: chunk.cbytes(),
                nbytes: chunk.nbytes,
            };
            if let Err(e) = fs::write(self.chunk_path(slot.loc), &chunk.data) {
                self.remove_chunk_files(&written);
                return Err(SChunkError::Io(e));
            }
            written.push(slot);
        }
        Ok(written)
    }

    fn remove_chunk_files(&self, slots: &[ChunkSlot]) {
        for slot in slots {
            if let Err(e) = fs::remove_file(self.chunk_path(slot.loc)) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(id = slot.loc, error = %e, "failed to remove chunk file");
                }
            }
        }
    }

    /// Publish a new manifest, then drop files it no longer references
    fn commit(
        &mut self,
        slots: Vec<ChunkSlot>,
        next_id: u64,
        meta: &StoreMeta,
        added: &[ChunkSlot],
        removed: &[ChunkSlot],
    ) -> Result<()> {
        let raw = encode_manifest(&self.manifest_for(slots.clone(), next_id, meta))?;
        if let Err(e) = write_atomic(&self.dir.join(MANIFEST_FILENAME), &raw) {
            self.remove_chunk_files(added);
            return Err(e);
        }

        self.remove_chunk_files(removed);
        trace!(
            added = added.len(),
            removed = removed.len(),
            nchunks = slots.len(),
            "sparse commit"
        );

        self.slots = slots;
        self.next_id = next_id;
        Ok(())
    }

    fn manifest_for(&self, chunks: Vec<ChunkSlot>, next_id: u64, meta: &StoreMeta) -> SparseManifest {
        SparseManifest {
            version: VERSION,
            chunk_size: meta.chunk_size,
            nbytes: meta.nbytes,
            cparams: meta.cparams.clone(),
            chunks,
            next_id,
        }
    }
}

fn encode_manifest(manifest: &SparseManifest) -> Result<Vec<u8>> {
    let body = bincode::serialize(manifest)?;
    let mut raw = Vec::with_capacity(8 + body.len());
    raw.extend_from_slice(MAGIC);
    raw.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    raw.extend_from_slice(&body);
    Ok(raw)
}

fn decode_manifest(raw: &[u8]) -> Result<SparseManifest> {
    if raw.len() < 8 || &raw[0..4] != MAGIC {
        return Err(SChunkError::CorruptData(
            "sparse manifest is missing its magic".to_string(),
        ));
    }

    let stored_crc = u32::from_le_bytes(raw[4..8].try_into().unwrap());
    let body = &raw[8..];
    let actual_crc = crc32fast::hash(body);
    if stored_crc != actual_crc {
        return Err(SChunkError::CorruptData(format!(
            "sparse manifest checksum mismatch: expected {:08x}, got {:08x}",
            stored_crc, actual_crc
        )));
    }

    let manifest: SparseManifest = bincode::deserialize(body)?;
    if manifest.version != VERSION {
        return Err(SChunkError::CorruptData(format!(
            "unsupported sparse manifest version: {}",
            manifest.version
        )));
    }
    Ok(manifest)
}
