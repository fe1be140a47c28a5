//! Parameters Module
//!
//! Compression and decompression configuration bundles.
//!
//! ## Responsibilities
//! - Closed enumerations for codecs, filters and split modes
//! - `CParams`: everything the codec needs to produce a chunk
//! - `DParams`: thread count used when decoding
//! - Range validation before any chunk is produced
//!
//! A store keeps one snapshot of each. Replacing the snapshot only affects
//! chunks appended afterwards; every chunk records its own parameters in its
//! header.

mod enums;
mod cparams;
mod dparams;

pub use enums::{Codec, Filter, SplitMode};
pub use cparams::{CParams, CParamsBuilder, CPARAMS_ENCODED_SIZE};
pub use dparams::DParams;

/// Number of slots in the filter pipeline
pub const MAX_FILTERS: usize = 6;

/// Largest supported type size
pub const MAX_TYPESIZE: usize = 255;

/// Highest compression level
pub const MAX_CLEVEL: u8 = 9;
