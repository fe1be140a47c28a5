//! Compression parameters

use serde::{Deserialize, Serialize};

use crate::error::{Result, SChunkError};

use super::{Codec, Filter, SplitMode, MAX_CLEVEL, MAX_FILTERS, MAX_TYPESIZE};

/// Size of the fixed binary snapshot written into frame headers
pub const CPARAMS_ENCODED_SIZE: usize = 28;

/// Compression parameters for a chunk
///
/// `filters` and `filters_meta` are fixed six-slot arrays, so the two always
/// have matching length. Unused slots hold `Filter::NoFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CParams {
    /// Compressor backend
    pub codec: Codec,
    /// Backend-specific metadata byte, stored in every chunk header
    pub codec_meta: u8,
    /// 0 (store verbatim) to 9 (maximum compression)
    pub clevel: u8,
    /// Train and embed a dictionary per chunk (zstd only)
    pub use_dict: bool,
    /// Element size in bytes, used by the shuffle-family filters
    pub typesize: u8,
    /// Worker threads used to compress the blocks of one chunk
    pub nthreads: u32,
    /// Block size in bytes; 0 picks one automatically
    pub blocksize: u32,
    pub splitmode: SplitMode,
    /// Filter pipeline, applied from slot 0 to slot 5
    pub filters: [Filter; MAX_FILTERS],
    pub filters_meta: [u8; MAX_FILTERS],
}

impl Default for CParams {
    fn default() -> Self {
        Self {
            codec: Codec::Lz4,
            codec_meta: 0,
            clevel: 5,
            use_dict: false,
            typesize: 8,
            nthreads: 1,
            blocksize: 0,
            splitmode: SplitMode::ForwardCompat,
            filters: [
                Filter::NoFilter,
                Filter::NoFilter,
                Filter::NoFilter,
                Filter::NoFilter,
                Filter::NoFilter,
                Filter::Shuffle,
            ],
            filters_meta: [0; MAX_FILTERS],
        }
    }
}

impl CParams {
    /// Create a new builder starting from the defaults
    pub fn builder() -> CParamsBuilder {
        CParamsBuilder::default()
    }

    /// Parameters used for vlmeta entries: small byte payloads, no filters
    pub fn metadata() -> Self {
        Self {
            codec: Codec::Zstd,
            clevel: 5,
            typesize: 1,
            splitmode: SplitMode::Never,
            filters: [Filter::NoFilter; MAX_FILTERS],
            ..Self::default()
        }
    }

    /// Check every field against its documented range
    pub fn validate(&self) -> Result<()> {
        if self.clevel > MAX_CLEVEL {
            return Err(SChunkError::InvalidParameter(format!(
                "clevel can only be in the 0-{} range, got {}",
                MAX_CLEVEL, self.clevel
            )));
        }

        if self.typesize == 0 || self.typesize as usize > MAX_TYPESIZE {
            return Err(SChunkError::InvalidParameter(format!(
                "typesize can only be in the 1-{} range, got {}",
                MAX_TYPESIZE, self.typesize
            )));
        }

        if self.nthreads == 0 {
            return Err(SChunkError::InvalidParameter(
                "nthreads must be a positive integer".to_string(),
            ));
        }

        for (filter, meta) in self.filters.iter().zip(self.filters_meta.iter()) {
            if *filter == Filter::TruncPrec {
                let mantissa_bits = match self.typesize {
                    4 => 23,
                    8 => 52,
                    other => {
                        return Err(SChunkError::InvalidParameter(format!(
                            "TruncPrec needs a typesize of 4 or 8, got {}",
                            other
                        )))
                    }
                };
                if *meta > mantissa_bits {
                    return Err(SChunkError::InvalidParameter(format!(
                        "TruncPrec precision {} exceeds {} mantissa bits",
                        meta, mantissa_bits
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether blocks of a chunk coded with these parameters are split into
    /// one stream per byte of the type
    pub(crate) fn should_split(&self) -> bool {
        if self.typesize < 2 {
            return false;
        }
        let small_type = self.typesize <= 16;
        match self.splitmode {
            SplitMode::Always => true,
            SplitMode::Never => false,
            SplitMode::Auto => {
                small_type && self.codec.is_lz4() && self.filters.contains(&Filter::Shuffle)
            }
            SplitMode::ForwardCompat => small_type && self.codec.is_lz4(),
        }
    }

    // =========================================================================
    // Fixed binary snapshot (frame header)
    // =========================================================================

    /// Encode as the fixed 28-byte snapshot
    ///
    /// ```text
    /// codec(1) codec_meta(1) clevel(1) use_dict(1) typesize(1) splitmode(1)
    /// reserved(2) nthreads(4) blocksize(4) filters(6) filters_meta(6)
    /// ```
    pub fn to_bytes(&self) -> [u8; CPARAMS_ENCODED_SIZE] {
        let mut buf = [0u8; CPARAMS_ENCODED_SIZE];
        buf[0] = self.codec as u8;
        buf[1] = self.codec_meta;
        buf[2] = self.clevel;
        buf[3] = self.use_dict as u8;
        buf[4] = self.typesize;
        buf[5] = self.splitmode as u8;
        buf[8..12].copy_from_slice(&self.nthreads.to_le_bytes());
        buf[12..16].copy_from_slice(&self.blocksize.to_le_bytes());
        for (i, filter) in self.filters.iter().enumerate() {
            buf[16 + i] = *filter as u8;
        }
        buf[22..28].copy_from_slice(&self.filters_meta);
        buf
    }

    /// Decode the fixed 28-byte snapshot
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < CPARAMS_ENCODED_SIZE {
            return Err(SChunkError::CorruptData(format!(
                "cparams snapshot needs {} bytes, got {}",
                CPARAMS_ENCODED_SIZE,
                buf.len()
            )));
        }

        let corrupt = |e: SChunkError| SChunkError::CorruptData(e.to_string());

        let mut filters = [Filter::NoFilter; MAX_FILTERS];
        for (i, slot) in filters.iter_mut().enumerate() {
            *slot = Filter::try_from(buf[16 + i]).map_err(corrupt)?;
        }
        let mut filters_meta = [0u8; MAX_FILTERS];
        filters_meta.copy_from_slice(&buf[22..28]);

        Ok(Self {
            codec: Codec::try_from(buf[0]).map_err(corrupt)?,
            codec_meta: buf[1],
            clevel: buf[2],
            use_dict: buf[3] != 0,
            typesize: buf[4],
            splitmode: SplitMode::try_from(buf[5]).map_err(corrupt)?,
            nthreads: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            blocksize: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            filters,
            filters_meta,
        })
    }
}

/// Builder for CParams
#[derive(Default)]
pub struct CParamsBuilder {
    cparams: CParams,
    filters: Option<Vec<Filter>>,
    filters_meta: Option<Vec<u8>>,
}

impl CParamsBuilder {
    /// Set the compressor backend
    pub fn codec(mut self, codec: Codec) -> Self {
        self.cparams.codec = codec;
        self
    }

    /// Set the codec metadata byte
    pub fn codec_meta(mut self, meta: u8) -> Self {
        self.cparams.codec_meta = meta;
        self
    }

    /// Set the compression level (0-9)
    pub fn clevel(mut self, clevel: u8) -> Self {
        self.cparams.clevel = clevel;
        self
    }

    /// Enable per-chunk dictionaries (zstd only)
    pub fn use_dict(mut self, use_dict: bool) -> Self {
        self.cparams.use_dict = use_dict;
        self
    }

    /// Set the element size in bytes (1-255)
    pub fn typesize(mut self, typesize: u8) -> Self {
        self.cparams.typesize = typesize;
        self
    }

    /// Set the number of compression threads
    pub fn nthreads(mut self, nthreads: u32) -> Self {
        self.cparams.nthreads = nthreads;
        self
    }

    /// Set the block size (0 = automatic)
    pub fn blocksize(mut self, blocksize: u32) -> Self {
        self.cparams.blocksize = blocksize;
        self
    }

    /// Set the split mode
    pub fn splitmode(mut self, splitmode: SplitMode) -> Self {
        self.cparams.splitmode = splitmode;
        self
    }

    /// Set the filter pipeline (at most 6 filters, applied in order)
    pub fn filters(mut self, filters: &[Filter]) -> Self {
        self.filters = Some(filters.to_vec());
        self
    }

    /// Set the filter metadata (same length as the filters)
    pub fn filters_meta(mut self, meta: &[u8]) -> Self {
        self.filters_meta = Some(meta.to_vec());
        self
    }

    /// Validate and produce the parameters
    pub fn build(mut self) -> Result<CParams> {
        if let Some(filters) = self.filters.take() {
            if filters.len() > MAX_FILTERS {
                return Err(SChunkError::InvalidParameter(format!(
                    "at most {} filters are supported, got {}",
                    MAX_FILTERS,
                    filters.len()
                )));
            }
            let meta = self.filters_meta.take().unwrap_or_else(|| vec![0; filters.len()]);
            if meta.len() != filters.len() {
                return Err(SChunkError::InvalidParameter(format!(
                    "filters ({}) and filters_meta ({}) lengths differ",
                    filters.len(),
                    meta.len()
                )));
            }
            self.cparams.filters = [Filter::NoFilter; MAX_FILTERS];
            self.cparams.filters_meta = [0; MAX_FILTERS];
            self.cparams.filters[..filters.len()].copy_from_slice(&filters);
            self.cparams.filters_meta[..meta.len()].copy_from_slice(&meta);
        } else if let Some(meta) = self.filters_meta.take() {
            if meta.len() != MAX_FILTERS {
                return Err(SChunkError::InvalidParameter(format!(
                    "filters_meta must cover all {} filter slots, got {}",
                    MAX_FILTERS,
                    meta.len()
                )));
            }
            self.cparams.filters_meta.copy_from_slice(&meta);
        }

        self.cparams.validate()?;
        Ok(self.cparams)
    }
}
