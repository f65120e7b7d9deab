//! Snapshot round trips and recovery from damaged snapshots.

use std::fs;

use tempfile::TempDir;

use stylematch::vector::{
    IndexStorage, SharedVectorIndex, VectorDimension, VectorError, VectorIndex,
};

use crate::common::{pid, random_unit_vectors};

const DIM: usize = 16;

fn sample_index(count: usize) -> VectorIndex {
    let mut index = VectorIndex::with_dimension(DIM).unwrap();
    for (i, v) in random_unit_vectors(count, DIM, 21).iter().enumerate() {
        index.insert(pid(10 + i as u64), v).unwrap();
    }
    index
}

#[test]
fn test_reloaded_index_answers_identically() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStorage::new(temp_dir.path().join("index"));
    let index = sample_index(150);
    storage.save(&index).unwrap();

    let loaded = storage.load().unwrap();
    assert_eq!(loaded, index);
    for query in random_unit_vectors(8, DIM, 22) {
        assert_eq!(loaded.search(&query, 12).unwrap(), index.search(&query, 12).unwrap());
    }

    let metadata = storage.metadata().unwrap();
    assert_eq!(metadata.count, 150);
    assert_eq!(metadata.dimension, DIM);
    assert_eq!(metadata.model_name, "ClipVitB32");
}

#[test]
fn test_save_after_remove_reflects_removal() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStorage::new(temp_dir.path());
    let shared = SharedVectorIndex::from_index(sample_index(20));

    shared.persist(&storage).unwrap();
    assert!(shared.remove(pid(15)).unwrap());
    shared.persist(&storage).unwrap();

    let restored = SharedVectorIndex::new(VectorDimension::new(DIM).unwrap());
    assert_eq!(restored.load(&storage).unwrap(), 19);
    assert!(!restored.read().contains(pid(15)));
    assert!(restored.read().contains(pid(16)));
}

#[test]
fn test_flipped_byte_is_detected() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStorage::new(temp_dir.path());
    storage.save(&sample_index(30)).unwrap();

    let path = temp_dir.path().join("vectors.bin");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(storage.load(), Err(VectorError::CorruptIndex { .. })));
}

#[test]
fn test_corrupt_snapshot_falls_back_to_empty() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStorage::new(temp_dir.path());
    storage.save(&sample_index(30)).unwrap();
    fs::write(temp_dir.path().join("ids.bin"), b"garbage").unwrap();

    let dimension = VectorDimension::new(DIM).unwrap();
    let index = storage.load_or_empty(dimension);
    assert!(index.is_empty());
    assert_eq!(index.dimension(), dimension);

    // The shared handle drops whatever it held before
    let shared = SharedVectorIndex::from_index(sample_index(5));
    assert_eq!(shared.load_or_reset(&storage), 0);
    assert!(shared.is_empty());
}

#[test]
fn test_failed_load_keeps_current_index() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStorage::new(temp_dir.path().join("missing"));
    let shared = SharedVectorIndex::from_index(sample_index(5));

    assert!(matches!(shared.load(&storage), Err(VectorError::Storage(_))));
    assert_eq!(shared.len(), 5);
}

#[test]
fn test_snapshot_of_other_dimension_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStorage::new(temp_dir.path());
    storage.save(&sample_index(4)).unwrap();

    let shared = SharedVectorIndex::new(VectorDimension::new(DIM * 2).unwrap());
    assert!(matches!(
        shared.load(&storage),
        Err(VectorError::DimensionMismatch { .. })
    ));
    assert!(shared.is_empty());

    let fallback = storage.load_or_empty(VectorDimension::new(DIM * 2).unwrap());
    assert!(fallback.is_empty());
    assert_eq!(fallback.dimension().get(), DIM * 2);
}
