//! Filter pipeline
//!
//! Filters run per block. Only the leading `len / typesize` whole elements
//! are transposed; trailing bytes that do not form a whole element are
//! carried through unchanged.

use crate::params::{Filter, MAX_FILTERS};

/// The six filter slots plus the element width they operate on
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pipeline {
    pub filters: [Filter; MAX_FILTERS],
    pub meta: [u8; MAX_FILTERS],
    pub typesize: usize,
}

impl Pipeline {
    fn is_noop(&self) -> bool {
        self.filters.iter().all(|f| *f == Filter::NoFilter)
    }

    /// Apply the filters in slot order
    pub fn forward(&self, block: &[u8]) -> Vec<u8> {
        let mut buf = block.to_vec();
        if self.is_noop() {
            return buf;
        }

        let mut scratch = vec![0u8; block.len()];
        for (filter, meta) in self.filters.iter().zip(self.meta.iter()) {
            match filter {
                Filter::NoFilter => {}
                Filter::Shuffle => {
                    shuffle(self.typesize, &buf, &mut scratch);
                    std::mem::swap(&mut buf, &mut scratch);
                }
                Filter::BitShuffle => {
                    bitshuffle(self.typesize, &buf, &mut scratch);
                    std::mem::swap(&mut buf, &mut scratch);
                }
                Filter::Delta => delta_encode(self.typesize, &mut buf),
                Filter::TruncPrec => trunc_prec(self.typesize, *meta, &mut buf),
            }
        }
        buf
    }

    /// Undo the filters in reverse slot order
    pub fn backward(&self, mut buf: Vec<u8>) -> Vec<u8> {
        if self.is_noop() {
            return buf;
        }

        let mut scratch = vec![0u8; buf.len()];
        for filter in self.filters.iter().rev() {
            match filter {
                Filter::NoFilter | Filter::TruncPrec => {}
                Filter::Shuffle => {
                    unshuffle(self.typesize, &buf, &mut scratch);
                    std::mem::swap(&mut buf, &mut scratch);
                }
                Filter::BitShuffle => {
                    bitunshuffle(self.typesize, &buf, &mut scratch);
                    std::mem::swap(&mut buf, &mut scratch);
                }
                Filter::Delta => delta_decode(self.typesize, &mut buf),
            }
        }
        buf
    }
}

// =============================================================================
// Byte shuffle
// =============================================================================

pub(crate) fn shuffle(typesize: usize, src: &[u8], dst: &mut [u8]) {
    let n = src.len() / typesize;
    for i in 0..n {
        for b in 0..typesize {
            dst[b * n + i] = src[i * typesize + b];
        }
    }
    let tail = n * typesize;
    dst[tail..src.len()].copy_from_slice(&src[tail..]);
}

pub(crate) fn unshuffle(typesize: usize, src: &[u8], dst: &mut [u8]) {
    let n = src.len() / typesize;
    for i in 0..n {
        for b in 0..typesize {
            dst[i * typesize + b] = src[b * n + i];
        }
    }
    let tail = n * typesize;
    dst[tail..src.len()].copy_from_slice(&src[tail..]);
}

// =============================================================================
// Bit shuffle
// =============================================================================

/// Bit plane `p = byte * 8 + bit` of every element is stored as one run of
/// `n` consecutive bits.
pub(crate) fn bitshuffle(typesize: usize, src: &[u8], dst: &mut [u8]) {
    let n = src.len() / typesize;
    let body = n * typesize;
    dst[..body].fill(0);

    for i in 0..n {
        for b in 0..typesize {
            let byte = src[i * typesize + b];
            if byte == 0 {
                continue;
            }
            for j in 0..8 {
                if (byte >> j) & 1 == 1 {
                    let pos = (b * 8 + j) * n + i;
                    dst[pos >> 3] |= 1 << (pos & 7);
                }
            }
        }
    }
    dst[body..src.len()].copy_from_slice(&src[body..]);
}

pub(crate) fn bitunshuffle(typesize: usize, src: &[u8], dst: &mut [u8]) {
    let n = src.len() / typesize;
    let body = n * typesize;
    dst[..body].fill(0);

    for plane in 0..typesize * 8 {
        let (b, j) = (plane / 8, plane % 8);
        for i in 0..n {
            let pos = plane * n + i;
            if (src[pos >> 3] >> (pos & 7)) & 1 == 1 {
                dst[i * typesize + b] |= 1 << j;
            }
        }
    }
    dst[body..src.len()].copy_from_slice(&src[body..]);
}

// =============================================================================
// Delta
// =============================================================================

pub(crate) fn delta_encode(typesize: usize, buf: &mut [u8]) {
    for k in (typesize..buf.len()).rev() {
        buf[k] = buf[k].wrapping_sub(buf[k - typesize]);
    }
}

pub(crate) fn delta_decode(typesize: usize, buf: &mut [u8]) {
    for k in typesize..buf.len() {
        buf[k] = buf[k].wrapping_add(buf[k - typesize]);
    }
}

// =============================================================================
// Precision truncation (lossy)
// =============================================================================

fn trunc_prec(typesize: usize, precision: u8, buf: &mut [u8]) {
    match typesize {
        4 => {
            let zeroed = 23 - precision.min(23) as u32;
            let mask = !((1u32 << zeroed) - 1);
            for elem in buf.chunks_exact_mut(4) {
                let v = u32::from_le_bytes([elem[0], elem[1], elem[2], elem[3]]) & mask;
                elem.copy_from_slice(&v.to_le_bytes());
            }
        }
        8 => {
            let zeroed = 52 - precision.min(52) as u32;
            let mask = !((1u64 << zeroed) - 1);
            for elem in buf.chunks_exact_mut(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(elem);
                let v = u64::from_le_bytes(raw) & mask;
                elem.copy_from_slice(&v.to_le_bytes());
            }
        }
        // Rejected by CParams::validate
        _ => {}
    }
}
