//! Tests for variable-length metadata
//!
//! These tests verify:
//! - set/get/delete/contains/len/clear semantics
//! - Insertion order, including update-in-place
//! - Values are stored compressed and round-trip exactly
//! - Persistence in both layouts, with chunk data left alone
//! - Key validation and missing-key errors

use std::collections::BTreeMap;
use std::path::PathBuf;

use proptest::prelude::*;
use schunk::vlmeta::MAX_KEY_LEN;
use schunk::{SChunk, SChunkConfig, SChunkError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn in_memory() -> SChunk {
    SChunk::new(SChunkConfig::builder().chunk_size(1000).build()).unwrap()
}

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn persisted(path: &std::path::Path, contiguous: bool) -> SChunk {
    let config = SChunkConfig::builder()
        .chunk_size(1000)
        .contiguous(contiguous)
        .urlpath(path)
        .build();
    SChunk::from_data(config, &[9u8; 2500]).unwrap()
}

fn keys(schunk: &SChunk) -> Vec<String> {
    schunk.vlmeta().keys().map(str::to_string).collect()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_scenario_set_delete() {
    let mut schunk = in_memory();
    let nested: BTreeMap<String, Vec<i32>> =
        [("a".to_string(), vec![1, 2, 3]), ("b".to_string(), vec![])].into_iter().collect();
    let nested_bytes = bincode::serialize(&nested).unwrap();

    {
        let mut vlmeta = schunk.vlmeta_mut();
        vlmeta.set("k1", b"val1").unwrap();
        vlmeta.set("k2", "val2".as_bytes()).unwrap();
        vlmeta.set("k3", &nested_bytes).unwrap();
        assert_eq!(vlmeta.len(), 3);

        vlmeta.delete("k2").unwrap();
        assert_eq!(vlmeta.len(), 2);
    }

    let vlmeta = schunk.vlmeta();
    assert!(matches!(vlmeta.get("k2"), Err(SChunkError::KeyNotFound(_))));
    assert_eq!(vlmeta.get("k1").unwrap(), b"val1");

    let decoded: BTreeMap<String, Vec<i32>> = bincode::deserialize(&vlmeta.get("k3").unwrap()).unwrap();
    assert_eq!(decoded, nested);
}

#[test]
fn test_scenario_clear() {
    let mut schunk = in_memory();
    {
        let mut vlmeta = schunk.vlmeta_mut();
        vlmeta.set("a", b"1").unwrap();
        vlmeta.set("b", b"2").unwrap();
        vlmeta.set("c", b"3").unwrap();
        vlmeta.clear().unwrap();
    }

    assert_eq!(schunk.vlmeta().len(), 0);
    assert!(schunk.vlmeta().is_empty());
    assert_eq!(schunk.vlmeta().keys().next(), None);
}

#[test]
fn test_contains() {
    let mut schunk = in_memory();
    schunk.vlmeta_mut().set("present", b"x").unwrap();

    assert!(schunk.vlmeta().contains("present"));
    assert!(!schunk.vlmeta().contains("absent"));
}

#[test]
fn test_delete_missing_key() {
    let mut schunk = in_memory();

    let result = schunk.vlmeta_mut().delete("ghost");
    assert!(matches!(result, Err(SChunkError::KeyNotFound(ref k)) if k == "ghost"));
}

#[test]
fn test_empty_and_large_values() {
    let mut schunk = in_memory();
    let large: Vec<u8> = (0..200_000u32).map(|i| (i % 97) as u8).collect();
    {
        let mut vlmeta = schunk.vlmeta_mut();
        vlmeta.set("empty", b"").unwrap();
        vlmeta.set("large", &large).unwrap();
    }

    let vlmeta = schunk.vlmeta();
    assert!(vlmeta.get("empty").unwrap().is_empty());
    assert_eq!(vlmeta.get("large").unwrap(), large);
    assert!(vlmeta.get_compressed("large").unwrap().len() < large.len());
}

#[test]
fn test_values_are_compressed_chunks() {
    let mut schunk = in_memory();
    schunk.vlmeta_mut().set("k", &[0u8; 10_000]).unwrap();

    let compressed = schunk.vlmeta().get_compressed("k").unwrap().clone();
    let sizes = schunk::codec::cbuffer_sizes(&compressed).unwrap();
    assert_eq!(sizes.nbytes, 10_000);
    assert_eq!(schunk::codec::get_clib(&compressed).unwrap(), "Zstd");
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_keys_in_insertion_order() {
    let mut schunk = in_memory();
    {
        let mut vlmeta = schunk.vlmeta_mut();
        for key in ["zeta", "alpha", "mid", "beta"] {
            vlmeta.set(key, key.as_bytes()).unwrap();
        }
    }

    assert_eq!(keys(&schunk), vec!["zeta", "alpha", "mid", "beta"]);
}

#[test]
fn test_update_keeps_position() {
    let mut schunk = in_memory();
    {
        let mut vlmeta = schunk.vlmeta_mut();
        vlmeta.set("first", b"1").unwrap();
        vlmeta.set("second", b"2").unwrap();
        vlmeta.set("third", b"3").unwrap();
        vlmeta.set("first", b"one, again").unwrap();
    }

    assert_eq!(keys(&schunk), vec!["first", "second", "third"]);
    assert_eq!(schunk.vlmeta().get("first").unwrap(), b"one, again");
}

#[test]
fn test_delete_then_reinsert_moves_to_end() {
    let mut schunk = in_memory();
    {
        let mut vlmeta = schunk.vlmeta_mut();
        vlmeta.set("a", b"1").unwrap();
        vlmeta.set("b", b"2").unwrap();
        vlmeta.set("c", b"3").unwrap();
        vlmeta.delete("a").unwrap();
        vlmeta.set("a", b"4").unwrap();
    }

    assert_eq!(keys(&schunk), vec!["b", "c", "a"]);
    assert_eq!(schunk.vlmeta().get("b").unwrap(), b"2");
}

#[test]
fn test_keys_iterator_is_restartable() {
    let mut schunk = in_memory();
    {
        let mut vlmeta = schunk.vlmeta_mut();
        vlmeta.set("x", b"1").unwrap();
        vlmeta.set("y", b"2").unwrap();
    }

    let vlmeta = schunk.vlmeta();
    let iter = vlmeta.keys();
    assert_eq!(iter.len(), 2);
    let first: Vec<&str> = iter.clone().collect();
    let second: Vec<&str> = iter.collect();
    assert_eq!(first, second);
    assert_eq!(vlmeta.into_iter().rev().collect::<Vec<_>>(), vec!["y", "x"]);
}

// =============================================================================
// Key Validation Tests
// =============================================================================

#[test]
fn test_empty_key_rejected() {
    let mut schunk = in_memory();

    assert!(matches!(schunk.vlmeta_mut().set("", b"x"), Err(SChunkError::InvalidInput(_))));
    assert!(schunk.vlmeta().is_empty());
}

#[test]
fn test_key_length_limit() {
    let mut schunk = in_memory();
    let longest = "k".repeat(MAX_KEY_LEN);
    let too_long = "k".repeat(MAX_KEY_LEN + 1);

    schunk.vlmeta_mut().set(&longest, b"ok").unwrap();
    assert!(matches!(
        schunk.vlmeta_mut().set(&too_long, b"no"),
        Err(SChunkError::InvalidInput(_))
    ));
    assert_eq!(schunk.vlmeta().len(), 1);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_vlmeta_survives_reopen() {
    for contiguous in [true, false] {
        let (_temp, dir) = setup_temp_dir();
        let path = dir.join("store");
        {
            let mut schunk = persisted(&path, contiguous);
            let mut vlmeta = schunk.vlmeta_mut();
            vlmeta.set("unit", b"celsius").unwrap();
            vlmeta.set("scale", &1.5f64.to_le_bytes()).unwrap();
            vlmeta.set("tmp", b"gone soon").unwrap();
            vlmeta.set("unit", b"kelvin").unwrap();
            vlmeta.delete("tmp").unwrap();
        }

        let schunk = SChunk::open(&path).unwrap();
        assert_eq!(keys(&schunk), vec!["unit", "scale"]);
        assert_eq!(schunk.vlmeta().get("unit").unwrap(), b"kelvin");
        assert_eq!(schunk.vlmeta().get("scale").unwrap(), 1.5f64.to_le_bytes());
        assert_eq!(schunk.to_vec().unwrap(), vec![9u8; 2500]);
    }
}

#[test]
fn test_clear_persists_and_keeps_chunks() {
    for contiguous in [true, false] {
        let (_temp, dir) = setup_temp_dir();
        let path = dir.join("store");
        {
            let mut schunk = persisted(&path, contiguous);
            schunk.vlmeta_mut().set("a", b"1").unwrap();
            schunk.vlmeta_mut().set("b", b"2").unwrap();
            schunk.vlmeta_mut().clear().unwrap();
        }

        let schunk = SChunk::open(&path).unwrap();
        assert!(schunk.vlmeta().is_empty());
        assert_eq!(schunk.nchunks(), 3);
        assert_eq!(schunk.nbytes(), 2500);
    }
}

#[test]
fn test_vlmeta_survives_chunk_mutations() {
    for contiguous in [true, false] {
        let (_temp, dir) = setup_temp_dir();
        let path = dir.join("store");
        {
            let mut schunk = persisted(&path, contiguous);
            schunk.vlmeta_mut().set("kept", b"yes").unwrap();
            schunk.delete_chunk(0).unwrap();
            schunk.delete_chunk(0).unwrap();
            schunk.compact().unwrap();
        }

        let schunk = SChunk::open(&path).unwrap();
        assert_eq!(schunk.vlmeta().get("kept").unwrap(), b"yes");
        assert_eq!(schunk.nbytes(), 500);
    }
}

#[test]
fn test_frame_vlmeta_corruption_detected() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("store.b2frame");
    {
        let mut schunk = persisted(&path, true);
        schunk.vlmeta_mut().set("key", b"value").unwrap();
    }

    // The vlmeta section ends the file; flip a byte inside it
    let mut bytes = std::fs::read(&path).unwrap();
    let pos = bytes.len() - 6;
    bytes[pos] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(SChunk::open(&path), Err(SChunkError::CorruptData(_))));
}

// =============================================================================
// Property Tests
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Set(String, Vec<u8>),
    Delete(String),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = prop_oneof![Just("a"), Just("b"), Just("c"), Just("d"), Just("e")].prop_map(String::from);
    prop_oneof![
        6 => (key.clone(), proptest::collection::vec(any::<u8>(), 0..64)).prop_map(|(k, v)| Op::Set(k, v)),
        3 => key.prop_map(Op::Delete),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_matches_ordered_model(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let mut schunk = in_memory();
        let mut model: Vec<(String, Vec<u8>)> = Vec::new();

        for op in ops {
            let mut vlmeta = schunk.vlmeta_mut();
            match op {
                Op::Set(key, value) => {
                    vlmeta.set(&key, &value).unwrap();
                    match model.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => model.push((key, value)),
                    }
                }
                Op::Delete(key) => {
                    let existed = model.iter().any(|(k, _)| *k == key);
                    let result = vlmeta.delete(&key);
                    if existed {
                        prop_assert!(result.is_ok());
                        model.retain(|(k, _)| *k != key);
                    } else {
                        prop_assert!(matches!(result, Err(SChunkError::KeyNotFound(_))), "expected KeyNotFound");
                    }
                }
                Op::Clear => {
                    vlmeta.clear().unwrap();
                    model.clear();
                }
            }
        }

        let vlmeta = schunk.vlmeta();
        prop_assert_eq!(vlmeta.len(), model.len());
        let expected_keys: Vec<&str> = model.iter().map(|(k, _)| k.as_str()).collect();
        prop_assert_eq!(vlmeta.keys().collect::<Vec<_>>(), expected_keys);
        for (key, value) in &model {
            prop_assert_eq!(&vlmeta.get(key).unwrap(), value);
        }
    }
}
