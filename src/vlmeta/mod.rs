//! Vlmeta Module
//!
//! Variable-length metadata: a small ordered key/value map attached to a
//! super-chunk.
//!
//! ## Responsibilities
//! - Keep entries in insertion order; updating a key keeps its position
//! - Store every value as a compressed chunk
//! - Persist the whole map alongside the owning store after each change
//!
//! Values are plain bytes. Structured values are the caller's business:
//! encode them (e.g. with bincode) before `set` and decode after `get`.
//!
//! ## Access
//! `SChunk::vlmeta()` hands out a `&VlMetaStore` for reads.
//! `SChunk::vlmeta_mut()` hands out a `VlMeta` guard whose mutations are
//! written through to storage before they become visible.

mod section;

use std::collections::HashMap;
use std::ops::Deref;

use bytes::Bytes;
use tracing::trace;

use crate::codec;
use crate::error::{Result, SChunkError};
use crate::params::CParams;
use crate::storage::{Storage, StoreMeta};

/// Longest key accepted, in bytes
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

// =============================================================================
// VlMetaStore
// =============================================================================

/// Ordered map from string keys to compressed byte values
#[derive(Debug, Clone, Default)]
pub struct VlMetaStore {
    /// Insertion order
    entries: Vec<(String, Bytes)>,
    /// Key -> position in `entries`
    index: HashMap<String, usize>,
}

impl VlMetaStore {
    /// Decompress and return the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let value = self.get_compressed(key)?;
        codec::decompress(value)
    }

    /// The compressed chunk stored under `key`
    pub fn get_compressed(&self, key: &str) -> Result<&Bytes> {
        self.index
            .get(key)
            .map(|&pos| &self.entries[pos].1)
            .ok_or_else(|| SChunkError::KeyNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order
    ///
    /// Call again (or clone the iterator) to start over.
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            inner: self.entries.iter(),
        }
    }

    /// `(key, compressed value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    // -------------------------------------------------------------------------
    // Crate-internal
    // -------------------------------------------------------------------------

    pub(crate) fn from_section(raw: &[u8]) -> Result<Self> {
        let mut store = Self::default();
        for (key, value) in section::decode(raw)? {
            if store.index.contains_key(&key) {
                return Err(SChunkError::CorruptData(format!(
                    "duplicate vlmeta key '{}'",
                    key
                )));
            }
            store.index.insert(key.clone(), store.entries.len());
            store.entries.push((key, value));
        }
        Ok(store)
    }

    pub(crate) fn to_section(&self) -> Result<Vec<u8>> {
        section::encode(&self.entries)
    }

    fn put(&mut self, key: &str, value: Bytes) {
        match self.index.get(key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), value));
            }
        }
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let pos = self
            .index
            .remove(key)
            .ok_or_else(|| SChunkError::KeyNotFound(key.to_string()))?;
        self.entries.remove(pos);
        for (_, p) in self.index.iter_mut() {
            if *p > pos {
                *p -= 1;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a VlMetaStore {
    type Item = &'a str;
    type IntoIter = Keys<'a>;

    fn into_iter(self) -> Keys<'a> {
        self.keys()
    }
}

/// Iterator over vlmeta keys in insertion order
#[derive(Clone)]
pub struct Keys<'a> {
    inner: std::slice::Iter<'a, (String, Bytes)>,
}

impl<'a> Iterator for Keys<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.inner.next().map(|(k, _)| k.as_str())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Keys<'_> {}

impl<'a> DoubleEndedIterator for Keys<'a> {
    fn next_back(&mut self) -> Option<&'a str> {
        self.inner.next_back().map(|(k, _)| k.as_str())
    }
}

// =============================================================================
// VlMeta (write guard)
// =============================================================================

/// Mutable view of a store's vlmeta
///
/// Each mutation builds the next map, persists it, and only then replaces
/// the in-memory map, so a failed write leaves both unchanged.
pub struct VlMeta<'a> {
    store: &'a mut VlMetaStore,
    storage: &'a mut Storage,
    meta: StoreMeta,
}

impl<'a> VlMeta<'a> {
    pub(crate) fn new(store: &'a mut VlMetaStore, storage: &'a mut Storage, meta: StoreMeta) -> Self {
        Self { store, storage, meta }
    }

    /// Store `value` under `key`, replacing any previous value in place
    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let compressed = Bytes::from(codec::compress2(value, &CParams::metadata())?);

        let mut next = self.store.clone();
        next.put(key, compressed);
        self.commit(next)?;

        trace!(key, len = value.len(), "vlmeta set");
        Ok(())
    }

    /// Remove `key`; `KeyNotFound` if it is absent
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let mut next = self.store.clone();
        next.remove(key)?;
        self.commit(next)?;

        trace!(key, "vlmeta delete");
        Ok(())
    }

    /// Remove every entry; chunk data is untouched
    pub fn clear(&mut self) -> Result<()> {
        if self.store.is_empty() {
            return Ok(());
        }
        self.commit(VlMetaStore::default())?;

        trace!("vlmeta clear");
        Ok(())
    }

    fn commit(&mut self, next: VlMetaStore) -> Result<()> {
        let section = next.to_section()?;
        self.storage.write_vlmeta(section, &self.meta)?;
        *self.store = next;
        Ok(())
    }
}

impl Deref for VlMeta<'_> {
    type Target = VlMetaStore;

    fn deref(&self) -> &VlMetaStore {
        &*self.store
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SChunkError::InvalidInput("vlmeta key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(SChunkError::InvalidInput(format!(
            "vlmeta key cannot be longer than {} bytes, got {}",
            MAX_KEY_LEN,
            key.len()
        )));
    }
    Ok(())
}
