//! Codec, filter and split-mode enumerations
//!
//! The discriminants are the bytes written into chunk headers and frame
//! headers, so they must never be renumbered.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SChunkError};

/// Compressor backend used for the blocks of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Codec {
    /// LZ4 block format (fast)
    Lz4 = 1,
    /// LZ4 high-compression mode; output is plain LZ4 blocks
    Lz4Hc = 2,
    /// Deflate wrapped in a zlib stream
    Zlib = 4,
    /// Zstandard
    Zstd = 5,
}

impl Codec {
    /// Every supported codec, in id order
    pub const ALL: [Codec; 4] = [Codec::Lz4, Codec::Lz4Hc, Codec::Zlib, Codec::Zstd];

    /// Short lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Codec::Lz4 => "lz4",
            Codec::Lz4Hc => "lz4hc",
            Codec::Zlib => "zlib",
            Codec::Zstd => "zstd",
        }
    }

    /// Name of the library that implements this codec
    pub fn lib_name(self) -> &'static str {
        match self {
            Codec::Lz4 | Codec::Lz4Hc => "LZ4",
            Codec::Zlib => "Zlib",
            Codec::Zstd => "Zstd",
        }
    }

    /// Codecs that trade speed for ratio get larger automatic blocks
    pub(crate) fn is_high_ratio(self) -> bool {
        matches!(self, Codec::Zlib | Codec::Zstd)
    }

    pub(crate) fn is_lz4(self) -> bool {
        matches!(self, Codec::Lz4 | Codec::Lz4Hc)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::Lz4
    }
}

impl TryFrom<u8> for Codec {
    type Error = SChunkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Codec::Lz4),
            2 => Ok(Codec::Lz4Hc),
            4 => Ok(Codec::Zlib),
            5 => Ok(Codec::Zstd),
            other => Err(SChunkError::InvalidParameter(format!(
                "unknown codec id {}",
                other
            ))),
        }
    }
}

/// Reversible (or, for `TruncPrec`, lossy) transform applied to a block
/// before it reaches the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Filter {
    NoFilter = 0,
    /// Byte transpose by type size
    Shuffle = 1,
    /// Bit transpose by type size
    BitShuffle = 2,
    /// Byte-wise difference against the previous element
    Delta = 3,
    /// Zero the low mantissa bits of f32/f64 elements
    TruncPrec = 4,
}

impl Default for Filter {
    fn default() -> Self {
        Filter::NoFilter
    }
}

impl TryFrom<u8> for Filter {
    type Error = SChunkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Filter::NoFilter),
            1 => Ok(Filter::Shuffle),
            2 => Ok(Filter::BitShuffle),
            3 => Ok(Filter::Delta),
            4 => Ok(Filter::TruncPrec),
            other => Err(SChunkError::InvalidParameter(format!(
                "unknown filter id {}",
                other
            ))),
        }
    }
}

/// Whether each block is coded as `typesize` separate byte streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SplitMode {
    Always = 1,
    Never = 2,
    /// Split for LZ4 codecs when a shuffle filter is active
    Auto = 3,
    /// Split for LZ4 codecs regardless of filters
    ForwardCompat = 4,
}

impl Default for SplitMode {
    fn default() -> Self {
        SplitMode::ForwardCompat
    }
}

impl TryFrom<u8> for SplitMode {
    type Error = SChunkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(SplitMode::Always),
            2 => Ok(SplitMode::Never),
            3 => Ok(SplitMode::Auto),
            4 => Ok(SplitMode::ForwardCompat),
            other => Err(SChunkError::InvalidParameter(format!(
                "unknown split mode {}",
                other
            ))),
        }
    }
}
