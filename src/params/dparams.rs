//! Decompression parameters

use serde::{Deserialize, Serialize};

use crate::error::{Result, SChunkError};

/// Decompression parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DParams {
    /// Worker threads used to decode the blocks of one chunk
    pub nthreads: u32,
}

impl Default for DParams {
    fn default() -> Self {
        Self { nthreads: 1 }
    }
}

impl DParams {
    pub fn new(nthreads: u32) -> Result<Self> {
        let dparams = Self { nthreads };
        dparams.validate()?;
        Ok(dparams)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nthreads == 0 {
            return Err(SChunkError::InvalidParameter(
                "nthreads must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
