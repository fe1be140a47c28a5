//! Configuration for a super-chunk
//!
//! Everything a store needs at construction time, with sensible defaults.
//! Thread counts and codec choices travel inside these values; nothing is
//! read from process-wide state.

use std::path::PathBuf;

use crate::error::{Result, SChunkError};
use crate::params::{CParams, DParams};

/// Default uncompressed chunk size: 1 MiB
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

/// Construction-time configuration of an `SChunk`
#[derive(Debug, Clone)]
pub struct SChunkConfig {
    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------
    /// Uncompressed bytes per chunk; only the last chunk may be shorter
    pub chunk_size: u32,

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------
    /// Single frame file (true) or sparse directory (false)
    ///
    /// Ignored when `urlpath` is `None`.
    pub contiguous: bool,

    /// Backing path; `None` keeps the store in memory
    /// Internal structure when sparse:
    ///   {urlpath}/
    ///     ├── index.b2
    ///     ├── vlmeta.b2
    ///     └── chunks/
    pub urlpath: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Codec
    // -------------------------------------------------------------------------
    /// Parameters for chunks appended from now on
    pub cparams: CParams,

    pub dparams: DParams,
}

impl Default for SChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            contiguous: false,
            urlpath: None,
            cparams: CParams::default(),
            dparams: DParams::default(),
        }
    }
}

impl SChunkConfig {
    /// Create a new config builder
    pub fn builder() -> SChunkConfigBuilder {
        SChunkConfigBuilder::default()
    }

    /// Check every field before a store is created from it
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SChunkError::InvalidInput(
                "chunk_size must be a positive integer".to_string(),
            ));
        }
        self.cparams.validate()?;
        self.dparams.validate()
    }
}

/// Builder for SChunkConfig
#[derive(Default)]
pub struct SChunkConfigBuilder {
    config: SChunkConfig,
}

impl SChunkConfigBuilder {
    /// Set the uncompressed chunk size (in bytes)
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Choose a single frame file over a sparse directory
    pub fn contiguous(mut self, contiguous: bool) -> Self {
        self.config.contiguous = contiguous;
        self
    }

    /// Persist the store at `path`
    pub fn urlpath(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.urlpath = Some(path.into());
        self
    }

    pub fn cparams(mut self, cparams: CParams) -> Self {
        self.config.cparams = cparams;
        self
    }

    pub fn dparams(mut self, dparams: DParams) -> Self {
        self.config.dparams = dparams;
        self
    }

    pub fn build(self) -> SChunkConfig {
        self.config
    }
}
