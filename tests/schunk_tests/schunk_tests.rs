//! Tests for in-memory super-chunks
//!
//! These tests verify:
//! - Chunking on construction and append
//! - Random-access decompression, with and without a destination
//! - Insert, update and delete by index
//! - The chunk size invariant and store sealing
//! - Error kinds for bad indices, short destinations and bad input

use proptest::prelude::*;
use schunk::{CParams, Codec, DParams, SChunk, SChunkConfig, SChunkError, StorageMode};

// =============================================================================
// Helper Functions
// =============================================================================

fn config(chunk_size: u32) -> SChunkConfig {
    SChunkConfig::builder()
        .chunk_size(chunk_size)
        .cparams(CParams::builder().typesize(4).build().unwrap())
        .build()
}

/// `n` little-endian i32 values 0..n
fn int_data(n: i32) -> Vec<u8> {
    (0..n).flat_map(|i| i.to_le_bytes()).collect()
}

/// 5000 bytes of a repeating 0..250 pattern
fn pattern_data() -> Vec<u8> {
    (0..5000).map(|i| (i % 250) as u8).collect()
}

fn concat_chunks(schunk: &SChunk) -> Vec<u8> {
    (0..schunk.nchunks())
        .flat_map(|i| schunk.decompress_chunk(i).unwrap())
        .collect()
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_new_is_empty() {
    let schunk = SChunk::new(config(1000)).unwrap();

    assert_eq!(schunk.nchunks(), 0);
    assert_eq!(schunk.nbytes(), 0);
    assert_eq!(schunk.cbytes(), 0);
    assert_eq!(schunk.cratio(), 0.0);
    assert_eq!(schunk.storage_mode(), StorageMode::InMemory);
    assert!(schunk.urlpath().is_none());
    assert!(!schunk.contiguous());
    assert!(schunk.to_vec().unwrap().is_empty());
}

#[test]
fn test_contiguous_without_path_is_in_memory() {
    let config = SChunkConfig::builder().chunk_size(100).contiguous(true).build();
    let schunk = SChunk::new(config).unwrap();

    assert_eq!(schunk.storage_mode(), StorageMode::InMemory);
}

#[test]
fn test_from_data_80000_bytes_in_20000_byte_chunks() {
    let data = int_data(20_000);
    let schunk = SChunk::from_data(config(20_000), &data).unwrap();

    assert_eq!(schunk.nchunks(), 4);
    assert_eq!(schunk.nbytes(), 80_000);
    for i in 0..4 {
        let chunk = schunk.decompress_chunk(i).unwrap();
        assert_eq!(chunk.len(), 20_000);
        assert_eq!(chunk, &data[i * 20_000..(i + 1) * 20_000]);
    }
}

#[test]
fn test_pattern_in_500_byte_chunks() {
    let data = pattern_data();
    let schunk = SChunk::from_data(config(500), &data).unwrap();

    assert_eq!(schunk.nchunks(), 10);
    assert_eq!(schunk.decompress_chunk(9).unwrap(), &data[4500..]);
}

#[test]
fn test_from_data_rejects_zero_chunk_size() {
    let result = SChunk::from_data(config(0), b"abc");

    assert!(matches!(result, Err(SChunkError::InvalidInput(_))));
}

#[test]
fn test_from_data_rejects_bad_cparams() {
    let mut config = config(100);
    config.cparams.clevel = 11;

    assert!(matches!(SChunk::new(config), Err(SChunkError::InvalidParameter(_))));
}

#[test]
fn test_compresses_typed_data() {
    let data = int_data(100_000);
    let schunk = SChunk::from_data(config(64 * 1024), &data).unwrap();

    assert!(schunk.cbytes() < schunk.nbytes());
    assert!(schunk.cratio() > 1.0);
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_returns_chunk_count() {
    let mut schunk = SChunk::new(config(1000)).unwrap();

    assert_eq!(schunk.append_data(&[1u8; 1000]).unwrap(), 1);
    assert_eq!(schunk.append_data(&[2u8; 2500]).unwrap(), 4);
    assert_eq!(schunk.nbytes(), 3500);

    let last = schunk.chunk(3).unwrap();
    assert!(last.is_last);
    assert_eq!(last.nbytes, 500);
}

#[test]
fn test_append_preserves_order() {
    let mut schunk = SChunk::new(config(256)).unwrap();
    let mut expected = Vec::new();
    for round in 0..10u8 {
        let piece = vec![round; 512];
        schunk.append_data(&piece).unwrap();
        expected.extend_from_slice(&piece);
    }

    assert_eq!(schunk.to_vec().unwrap(), expected);
}

#[test]
fn test_append_empty_is_invalid() {
    let mut schunk = SChunk::new(config(100)).unwrap();

    assert!(matches!(schunk.append_data(&[]), Err(SChunkError::InvalidInput(_))));
}

#[test]
fn test_partial_last_chunk_seals_store() {
    let mut schunk = SChunk::from_data(config(100), &[7u8; 150]).unwrap();

    let result = schunk.append_data(&[1u8; 10]);
    assert!(matches!(result, Err(SChunkError::InvalidInput(_))));
    assert_eq!(schunk.nchunks(), 2);
    assert_eq!(schunk.nbytes(), 150);
}

#[test]
fn test_append_uses_new_cparams() {
    let mut schunk = SChunk::from_data(config(1000), &[1u8; 1000]).unwrap();
    let zstd = CParams::builder().codec(Codec::Zstd).typesize(4).build().unwrap();
    schunk.set_cparams(zstd.clone()).unwrap();
    schunk.append_data(&[2u8; 1000]).unwrap();

    assert_eq!(schunk.cparams(), &zstd);
    assert_eq!(schunk::codec::get_clib(&schunk.get_chunk(0).unwrap()).unwrap(), "LZ4");
    assert_eq!(schunk::codec::get_clib(&schunk.get_chunk(1).unwrap()).unwrap(), "Zstd");
}

#[test]
fn test_set_cparams_validates() {
    let mut schunk = SChunk::new(config(100)).unwrap();
    let mut bad = CParams::default();
    bad.typesize = 0;

    assert!(matches!(schunk.set_cparams(bad), Err(SChunkError::InvalidParameter(_))));
    assert_eq!(schunk.cparams().typesize, 4);
}

// =============================================================================
// Decompression Tests
// =============================================================================

#[test]
fn test_decompress_into_matches_decompress() {
    let data = int_data(5000);
    let schunk = SChunk::from_data(config(4000), &data).unwrap();

    for i in 0..schunk.nchunks() {
        let expected = schunk.decompress_chunk(i).unwrap();
        let mut dst = vec![0u8; expected.len()];
        let written = schunk.decompress_chunk_into(i, &mut dst).unwrap();
        assert_eq!(written, expected.len());
        assert_eq!(dst, expected);
    }
}

#[test]
fn test_decompress_into_short_destination() {
    let schunk = SChunk::from_data(config(1000), &[3u8; 1000]).unwrap();
    let mut dst = vec![0u8; 999];

    let result = schunk.decompress_chunk_into(0, &mut dst);
    assert!(matches!(
        result,
        Err(SChunkError::InsufficientDestination { needed: 1000, available: 999 })
    ));
}

#[test]
fn test_index_out_of_range() {
    let schunk = SChunk::from_data(config(1000), &[3u8; 3000]).unwrap();
    let mut dst = vec![0u8; 1000];

    assert!(matches!(
        schunk.decompress_chunk(3),
        Err(SChunkError::IndexOutOfRange { index: 3, len: 3 })
    ));
    assert!(matches!(
        schunk.decompress_chunk_into(7, &mut dst),
        Err(SChunkError::IndexOutOfRange { .. })
    ));
    assert!(matches!(schunk.get_chunk(3), Err(SChunkError::IndexOutOfRange { .. })));
    assert!(matches!(schunk.chunk(3), Err(SChunkError::IndexOutOfRange { .. })));
}

#[test]
fn test_multithreaded_dparams() {
    let data = int_data(200_000);
    let mut schunk = SChunk::from_data(config(400_000), &data).unwrap();
    schunk.set_dparams(DParams::new(4).unwrap()).unwrap();

    assert_eq!(schunk.dparams().nthreads, 4);
    assert_eq!(schunk.to_vec().unwrap(), data);
}

// =============================================================================
// Raw Chunk Tests
// =============================================================================

#[test]
fn test_get_chunk_is_self_describing() {
    let data = pattern_data();
    let schunk = SChunk::from_data(config(500), &data).unwrap();

    let raw = schunk.get_chunk(2).unwrap();
    assert_eq!(schunk::decompress(&raw).unwrap(), &data[1000..1500]);

    let chunk = schunk.chunk(2).unwrap();
    assert_eq!(chunk.index, 2);
    assert_eq!(chunk.data, raw);
    assert_eq!(chunk.nbytes, 500);
    assert!(!chunk.is_last);
    assert_eq!(chunk.decompress().unwrap(), &data[1000..1500]);
}

#[test]
fn test_append_chunk_from_another_store() {
    let source = SChunk::from_data(config(500), &pattern_data()).unwrap();
    let mut target = SChunk::new(config(500)).unwrap();

    for i in 0..source.nchunks() {
        target.append_chunk(&source.get_chunk(i).unwrap()).unwrap();
    }

    assert_eq!(target.nchunks(), 10);
    assert_eq!(target.nbytes(), 5000);
    assert_eq!(target.cbytes(), source.cbytes());
    assert_eq!(target.to_vec().unwrap(), pattern_data());
}

#[test]
fn test_append_chunk_rejects_oversized_chunk() {
    let big = schunk::compress2(&[0u8; 600], &CParams::default()).unwrap();
    let mut schunk = SChunk::new(config(500)).unwrap();

    assert!(matches!(schunk.append_chunk(&big), Err(SChunkError::InvalidInput(_))));
}

#[test]
fn test_append_chunk_rejects_corrupt_chunk() {
    let mut chunk = schunk::compress2(&[0u8; 500], &CParams::default()).unwrap();
    chunk.truncate(chunk.len() - 1);
    let mut schunk = SChunk::new(config(500)).unwrap();

    assert!(matches!(schunk.append_chunk(&chunk), Err(SChunkError::CorruptData(_))));
    assert_eq!(schunk.nchunks(), 0);
}

#[test]
fn test_insert_chunk_shifts_later_chunks() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 300]).unwrap();
    let chunk = schunk::compress2(&[9u8; 100], &CParams::default()).unwrap();

    assert_eq!(schunk.insert_chunk(1, &chunk).unwrap(), 4);
    assert_eq!(schunk.nbytes(), 400);
    assert_eq!(schunk.decompress_chunk(0).unwrap(), vec![1u8; 100]);
    assert_eq!(schunk.decompress_chunk(1).unwrap(), vec![9u8; 100]);
    assert_eq!(schunk.decompress_chunk(2).unwrap(), vec![1u8; 100]);
}

#[test]
fn test_insert_partial_chunk_in_middle_is_invalid() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 300]).unwrap();
    let short = schunk::compress2(&[9u8; 40], &CParams::default()).unwrap();

    assert!(matches!(schunk.insert_chunk(1, &short), Err(SChunkError::InvalidInput(_))));
    assert!(matches!(
        schunk.insert_chunk(4, &short),
        Err(SChunkError::IndexOutOfRange { index: 4, len: 3 })
    ));

    // At the end it becomes the new last chunk
    assert_eq!(schunk.insert_chunk(3, &short).unwrap(), 4);
    assert_eq!(schunk.nbytes(), 340);
}

#[test]
fn test_update_chunk_replaces_in_place() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 250]).unwrap();
    let full = schunk::compress2(&[5u8; 100], &CParams::default()).unwrap();
    let short = schunk::compress2(&[6u8; 20], &CParams::default()).unwrap();

    schunk.update_chunk(0, &full).unwrap();
    schunk.update_chunk(2, &short).unwrap();

    assert_eq!(schunk.nchunks(), 3);
    assert_eq!(schunk.nbytes(), 220);
    assert_eq!(schunk.decompress_chunk(0).unwrap(), vec![5u8; 100]);
    assert_eq!(schunk.decompress_chunk(2).unwrap(), vec![6u8; 20]);
    assert!(matches!(schunk.update_chunk(1, &short), Err(SChunkError::InvalidInput(_))));
    assert!(matches!(schunk.update_chunk(3, &full), Err(SChunkError::IndexOutOfRange { .. })));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_chunk_shifts_indices() {
    let data = pattern_data();
    let mut schunk = SChunk::from_data(config(500), &data).unwrap();

    assert_eq!(schunk.delete_chunk(3).unwrap(), 9);
    assert_eq!(schunk.nbytes(), 4500);
    assert_eq!(schunk.decompress_chunk(3).unwrap(), &data[2000..2500]);

    let mut expected = data[..1500].to_vec();
    expected.extend_from_slice(&data[2000..]);
    assert_eq!(schunk.to_vec().unwrap(), expected);
}

#[test]
fn test_delete_last_partial_chunk_unseals() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 150]).unwrap();

    schunk.delete_chunk(1).unwrap();
    assert_eq!(schunk.nbytes(), 100);
    assert_eq!(schunk.append_data(&[2u8; 100]).unwrap(), 2);
}

#[test]
fn test_delete_out_of_range() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 100]).unwrap();

    assert!(matches!(
        schunk.delete_chunk(1),
        Err(SChunkError::IndexOutOfRange { index: 1, len: 1 })
    ));
    assert_eq!(schunk.nchunks(), 1);
}

#[test]
fn test_delete_all_chunks() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 500]).unwrap();
    while schunk.nchunks() > 0 {
        schunk.delete_chunk(0).unwrap();
    }

    assert_eq!(schunk.nbytes(), 0);
    assert_eq!(schunk.cbytes(), 0);
}

#[test]
fn test_compact_in_memory_is_noop() {
    let mut schunk = SChunk::from_data(config(100), &[1u8; 500]).unwrap();
    schunk.compact().unwrap();

    assert_eq!(schunk.to_vec().unwrap(), vec![1u8; 500]);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_chunking_round_trips(
        data in proptest::collection::vec(any::<u8>(), 1..20_000),
        chunk_size in 1u32..5000,
    ) {
        let schunk = SChunk::from_data(
            SChunkConfig::builder().chunk_size(chunk_size).build(),
            &data,
        ).unwrap();

        let expected_chunks = (data.len() + chunk_size as usize - 1) / chunk_size as usize;
        prop_assert_eq!(schunk.nchunks(), expected_chunks);
        prop_assert_eq!(schunk.nbytes(), data.len() as u64);
        prop_assert_eq!(concat_chunks(&schunk), data);
    }

    #[test]
    fn prop_appends_round_trip(
        pieces in proptest::collection::vec(1usize..8, 1..6),
        chunk_size in 16u32..256,
    ) {
        // Whole-chunk appends keep the store open; the final piece may be short
        let mut schunk = SChunk::new(SChunkConfig::builder().chunk_size(chunk_size).build()).unwrap();
        let mut expected = Vec::new();
        for (i, nchunks) in pieces.iter().enumerate() {
            let piece: Vec<u8> = (0..nchunks * chunk_size as usize)
                .map(|j| (i * 31 + j) as u8)
                .collect();
            schunk.append_data(&piece).unwrap();
            expected.extend_from_slice(&piece);
        }
        let tail = vec![0xEEu8; chunk_size as usize / 2];
        schunk.append_data(&tail).unwrap();
        expected.extend_from_slice(&tail);

        prop_assert_eq!(schunk.to_vec().unwrap(), expected);
    }
}
