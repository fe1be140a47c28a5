//! # schunk
//!
//! A chunked, compressed container for large binary buffers with:
//! - Fixed-size chunks, each independently decompressible
//! - Random-access reads, plus insert, update and delete by index
//! - In-memory, single-file (frame) and directory (sparse) persistence
//! - An embedded key/value store for variable-length metadata
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          SChunk                              │
//! │        append / decompress / insert / update / delete        │
//! └───────────┬───────────────────────────────┬─────────────────┘
//!             │                               │
//!             ▼                               ▼
//!   ┌───────────────────┐           ┌───────────────────┐
//!   │       Codec       │           │      VlMeta       │
//!   │ filters + blocks  │◄──────────│  key -> chunk     │
//!   │ lz4 / zlib / zstd │           └─────────┬─────────┘
//!   └───────────────────┘                     │
//!             ▲                               │
//!             │                               ▼
//!   ┌─────────┴───────────────────────────────────────────┐
//!   │                      Storage                          │
//!   │      memory  |  frame file  |  sparse directory       │
//!   └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use schunk::{SChunk, SChunkConfig};
//!
//! let config = SChunkConfig::builder().chunk_size(4096).build();
//! let mut schunk = SChunk::new(config)?;
//! schunk.append_data(&vec![7u8; 10_000])?;
//! assert_eq!(schunk.nchunks(), 3);
//!
//! schunk.vlmeta_mut().set("origin", b"sensor-12")?;
//! assert_eq!(schunk.vlmeta().get("origin")?, b"sensor-12");
//! # Ok::<(), schunk::SChunkError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod params;
pub mod codec;
pub mod storage;
pub mod schunk;
pub mod vlmeta;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SChunkError};
pub use config::{SChunkConfig, SChunkConfigBuilder, DEFAULT_CHUNK_SIZE};
pub use params::{CParams, CParamsBuilder, Codec, DParams, Filter, SplitMode};
pub use codec::{compress, compress2, decompress, decompress_into};
pub use storage::{remove_urlpath, StorageMode};
pub use schunk::{Chunk, SChunk};
pub use vlmeta::{VlMeta, VlMetaStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of schunk
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
