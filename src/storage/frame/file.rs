//! Frame file storage

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SChunkError};
use crate::storage::{temp_path, ChunkSlot, EncodedChunk, StoreMeta};

use super::header::FrameHeader;
use super::{HEADER_SIZE, INDEX_ENTRY_SIZE, RECORD_HEADER_SIZE};

/// A super-chunk persisted as one log-structured file
///
/// ## Concurrency:
/// - `file`: Mutex so chunk reads can seek through `&self`
/// - Mutations take `&mut self` and go through `Mutex::get_mut`
pub(crate) struct FrameStorage {
    path: PathBuf,
    file: Mutex<File>,
    /// Live chunks in logical order; `loc` is the record offset
    slots: Vec<ChunkSlot>,
    /// Current vlmeta section, rewritten with every trailer
    vlmeta: Vec<u8>,
    /// Offset of the current trailer
    trailer_offset: u64,
    trailer_len: u64,
    trailer_crc: u32,
    /// End of file: where the next record goes
    end: u64,
}

impl FrameStorage {
    /// Create a new frame file; fails if `path` already exists
    pub fn create(path: &Path, meta: &StoreMeta, chunks: &[EncodedChunk]) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut storage = Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            slots: Vec::new(),
            vlmeta: Vec::new(),
            trailer_offset: HEADER_SIZE,
            trailer_len: 0,
            trailer_crc: 0,
            end: HEADER_SIZE,
        };

        if let Err(e) = storage.append(chunks, meta) {
            let _ = fs::remove_file(path);
            return Err(e);
        }

        debug!(path = %path.display(), nchunks = chunks.len(), "created frame");
        Ok(storage)
    }

    /// Open an existing frame file
    ///
    /// Returns the storage, the recorded store metadata and the raw vlmeta
    /// section.
    pub fn open(path: &Path) -> Result<(Self, StoreMeta, Vec<u8>)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf).map_err(|e| {
            SChunkError::CorruptData(format!("frame header unreadable: {}", e))
        })?;
        let header = FrameHeader::decode(&header_buf)?;

        // Trailer: chunk index followed by the vlmeta section
        let index_len = header
            .nchunks
            .checked_mul(INDEX_ENTRY_SIZE)
            .ok_or_else(|| SChunkError::CorruptData("frame chunk count overflows".to_string()))?;
        let trailer_len = index_len.saturating_add(header.vlmeta_len);
        let trailer_end = header.trailer_offset.saturating_add(trailer_len);
        if header.trailer_offset < HEADER_SIZE || trailer_end > file_len {
            return Err(SChunkError::CorruptData(format!(
                "frame trailer {}..{} lies outside the file ({} bytes)",
                header.trailer_offset, trailer_end, file_len
            )));
        }

        let mut trailer = vec![0u8; trailer_len as usize];
        file.seek(SeekFrom::Start(header.trailer_offset))?;
        file.read_exact(&mut trailer)?;

        let actual_crc = crc32fast::hash(&trailer);
        if actual_crc != header.trailer_crc {
            return Err(SChunkError::CorruptData(format!(
                "frame trailer checksum mismatch: expected {:08x}, got {:08x}",
                header.trailer_crc, actual_crc
            )));
        }

        let mut slots = Vec::with_capacity(header.nchunks as usize);
        for entry in trailer[..index_len as usize].chunks_exact(INDEX_ENTRY_SIZE as usize) {
            let slot = ChunkSlot {
                loc: u64::from_le_bytes(entry[0..8].try_into().unwrap()),
                cbytes: u32::from_le_bytes(entry[8..12].try_into().unwrap()),
                nbytes: u32::from_le_bytes(entry[12..16].try_into().unwrap()),
            };
            if slot.loc.saturating_add(RECORD_HEADER_SIZE + slot.cbytes as u64) > header.trailer_offset {
                return Err(SChunkError::CorruptData(format!(
                    "chunk record at {} overruns the trailer",
                    slot.loc
                )));
            }
            slots.push(slot);
        }
        let vlmeta = trailer[index_len as usize..].to_vec();

        let meta = StoreMeta {
            chunk_size: header.chunk_size,
            nbytes: header.nbytes,
            cparams: header.cparams,
        };

        debug!(
            path = %path.display(),
            nchunks = slots.len(),
            nbytes = meta.nbytes,
            "opened frame"
        );

        let storage = Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            slots,
            vlmeta: vlmeta.clone(),
            trailer_offset: header.trailer_offset,
            trailer_len,
            trailer_crc: header.trailer_crc,
            end: file_len,
        };
        Ok((storage, meta, vlmeta))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nchunks(&self) -> usize {
        self.slots.len()
    }

    pub fn chunk_sizes(&self, index: usize) -> (u32, u32) {
        let slot = &self.slots[index];
        (slot.nbytes, slot.cbytes)
    }

    /// Read one chunk record and check it against the index
    pub fn read_chunk(&self, index: usize) -> Result<Bytes> {
        let slot = self.slots[index];
        let mut record = vec![0u8; RECORD_HEADER_SIZE as usize + slot.cbytes as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(slot.loc))?;
            file.read_exact(&mut record)?;
        }

        let cbytes = u32::from_le_bytes(record[0..4].try_into().unwrap());
        let nbytes = u32::from_le_bytes(record[4..8].try_into().unwrap());
        if cbytes != slot.cbytes || nbytes != slot.nbytes {
            return Err(SChunkError::CorruptData(format!(
                "chunk record at {} does not match the frame index",
                slot.loc
            )));
        }

        let mut data = Bytes::from(record);
        Ok(data.split_off(RECORD_HEADER_SIZE as usize))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn append(&mut self, chunks: &[EncodedChunk], meta: &StoreMeta) -> Result<()> {
        let mut slots = self.slots.clone();
        slots.extend(self.plan_records(chunks));
        let vlmeta = self.vlmeta.clone();
        self.commit(chunks, slots, vlmeta, meta)
    }

    pub fn insert(&mut self, index: usize, chunk: &EncodedChunk, meta: &StoreMeta) -> Result<()> {
        let records = std::slice::from_ref(chunk);
        let mut slots = self.slots.clone();
        slots.insert(index, self.plan_records(records)[0]);
        let vlmeta = self.vlmeta.clone();
        self.commit(records, slots, vlmeta, meta)
    }

    /// Writes a new record; the old one becomes dead space
    pub fn update(&mut self, index: usize, chunk: &EncodedChunk, meta: &StoreMeta) -> Result<()> {
        let records = std::slice::from_ref(chunk);
        let mut slots = self.slots.clone();
        slots[index] = self.plan_records(records)[0];
        let vlmeta = self.vlmeta.clone();
        self.commit(records, slots, vlmeta, meta)
    }

    /// Drops the chunk from the index; its record stays behind as dead space
    pub fn delete(&mut self, index: usize, meta: &StoreMeta) -> Result<()> {
        let mut slots = self.slots.clone();
        slots.remove(index);
        let vlmeta = self.vlmeta.clone();
        self.commit(&[], slots, vlmeta, meta)
    }

    pub fn write_vlmeta(&mut self, section: Vec<u8>, meta: &StoreMeta) -> Result<()> {
        let slots = self.slots.clone();
        self.commit(&[], slots, section, meta)
    }

    /// Rewrite only the header (store metadata changed, chunks did not)
    pub fn write_header(&mut self, meta: &StoreMeta) -> Result<()> {
        let header = header_for(
            meta,
            self.slots.len(),
            self.trailer_offset,
            self.vlmeta.len(),
            self.trailer_crc,
        );
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrite the frame with only its live records
    pub fn compact(&mut self, meta: &StoreMeta) -> Result<()> {
        let before = self.end;
        let tmp = temp_path(&self.path);

        let result = self.write_compacted(&tmp, meta);
        let (file, slots, trailer_len, trailer_crc) = match result {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(SChunkError::Io(e));
        }

        let trailer_offset = HEADER_SIZE + slots.iter().map(record_len).sum::<u64>();
        self.file = Mutex::new(file);
        self.slots = slots;
        self.trailer_offset = trailer_offset;
        self.trailer_len = trailer_len;
        self.trailer_crc = trailer_crc;
        self.end = trailer_offset + trailer_len;

        info!(
            path = %self.path.display(),
            before,
            after = self.end,
            "compacted frame"
        );
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Slots the given records will occupy when appended at the end
    fn plan_records(&self, chunks: &[EncodedChunk]) -> Vec<ChunkSlot> {
        let mut offset = self.end;
        chunks
            .iter()
            .map(|chunk| {
                let slot = ChunkSlot { loc: offset, cbytes: chunk.cbytes(), nbytes: chunk.nbytes };
                offset += record_len(&slot);
                slot
            })
            .collect()
    }

    /// Append records and a trailer, then point the header at it
    ///
    /// Once the header is written the commit stands; the compaction that may
    /// follow is best-effort and only logs its failure.
    fn commit(
        &mut self,
        records: &[EncodedChunk],
        slots: Vec<ChunkSlot>,
        vlmeta: Vec<u8>,
        meta: &StoreMeta,
    ) -> Result<()> {
        let trailer = encode_trailer(&slots, &vlmeta);
        let trailer_crc = crc32fast::hash(&trailer);
        let records_len: u64 = records.iter().map(|r| RECORD_HEADER_SIZE + r.cbytes() as u64).sum();
        let trailer_offset = self.end + records_len;
        let header = header_for(meta, slots.len(), trailer_offset, vlmeta.len(), trailer_crc);

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(self.end))?;
        {
            let mut writer = BufWriter::new(&mut *file);
            for record in records {
                write_record(&mut writer, record)?;
            }
            writer.write_all(&trailer)?;
            writer.flush()?;
        }
        file.sync_data()?;

        // Commit point
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_data()?;

        trace!(
            records = records.len(),
            nchunks = slots.len(),
            trailer_offset,
            "frame commit"
        );

        self.slots = slots;
        self.vlmeta = vlmeta;
        self.trailer_offset = trailer_offset;
        self.trailer_len = trailer.len() as u64;
        self.trailer_crc = trailer_crc;
        self.end = trailer_offset + self.trailer_len;

        if self.needs_compaction() {
            if let Err(e) = self.compact(meta) {
                warn!(
                    path = %self.path.display(),
                    dead = self.dead_bytes(),
                    error = %e,
                    "automatic compaction failed"
                );
            }
        }
        Ok(())
    }

    fn write_compacted(&self, tmp: &Path, meta: &StoreMeta) -> Result<(File, Vec<ChunkSlot>, u64, u32)> {
        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp)?;

        let mut new_slots = Vec::with_capacity(self.slots.len());
        let mut offset = HEADER_SIZE;
        out.seek(SeekFrom::Start(HEADER_SIZE))?;

        let trailer = {
            let mut writer = BufWriter::new(&mut out);
            for (index, slot) in self.slots.iter().enumerate() {
                let data = self.read_chunk(index)?;
                write_record(&mut writer, &EncodedChunk { data, nbytes: slot.nbytes })?;
                let moved = ChunkSlot { loc: offset, ..*slot };
                offset += record_len(&moved);
                new_slots.push(moved);
            }
            let trailer = encode_trailer(&new_slots, &self.vlmeta);
            writer.write_all(&trailer)?;
            writer.flush()?;
            trailer
        };

        let trailer_crc = crc32fast::hash(&trailer);
        let header = header_for(meta, new_slots.len(), offset, self.vlmeta.len(), trailer_crc);
        out.seek(SeekFrom::Start(0))?;
        out.write_all(&header.encode())?;
        out.sync_all()?;

        Ok((out, new_slots, trailer.len() as u64, trailer_crc))
    }

    fn live_bytes(&self) -> u64 {
        self.slots.iter().map(record_len).sum()
    }

    /// Dead space outweighs live records plus the current trailer
    fn needs_compaction(&self) -> bool {
        self.dead_bytes() > self.live_bytes() + self.trailer_len
    }

    /// Space taken by deleted records and superseded trailers
    fn dead_bytes(&self) -> u64 {
        self.end
            .saturating_sub(HEADER_SIZE)
            .saturating_sub(self.live_bytes())
            .saturating_sub(self.trailer_len)
    }
}

fn header_for(
    meta: &StoreMeta,
    nchunks: usize,
    trailer_offset: u64,
    vlmeta_len: usize,
    trailer_crc: u32,
) -> FrameHeader {
    FrameHeader {
        chunk_size: meta.chunk_size,
        nbytes: meta.nbytes,
        nchunks: nchunks as u64,
        trailer_offset,
        vlmeta_len: vlmeta_len as u64,
        trailer_crc,
        cparams: meta.cparams.clone(),
    }
}

fn record_len(slot: &ChunkSlot) -> u64 {
    RECORD_HEADER_SIZE + slot.cbytes as u64
}

fn write_record<W: Write>(writer: &mut W, record: &EncodedChunk) -> Result<()> {
    writer.write_all(&record.cbytes().to_le_bytes())?;
    writer.write_all(&record.nbytes.to_le_bytes())?;
    writer.write_all(&record.data)?;
    Ok(())
}

fn encode_trailer(slots: &[ChunkSlot], vlmeta: &[u8]) -> Vec<u8> {
    let mut trailer = Vec::with_capacity(slots.len() * INDEX_ENTRY_SIZE as usize + vlmeta.len());
    for slot in slots {
        trailer.extend_from_slice(&slot.loc.to_le_bytes());
        trailer.extend_from_slice(&slot.cbytes.to_le_bytes());
        trailer.extend_from_slice(&slot.nbytes.to_le_bytes());
    }
    trailer.extend_from_slice(vlmeta);
    trailer
}
