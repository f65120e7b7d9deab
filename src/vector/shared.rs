//! Thread-safe handle to a [`VectorIndex`].
//!
//! Any number of readers may search concurrently. Mutations take the write
//! lock and are therefore exclusive with each other and with every in-flight
//! search, so no reader ever observes a half-replaced matrix.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::vector::index::VectorIndex;
use crate::vector::storage::IndexStorage;
use crate::vector::types::{ProductId, Score, VectorDimension, VectorError};

/// Shared single-writer / multi-reader vector index.
///
/// Cloning the handle is cheap; all clones see the same index.
#[derive(Clone)]
pub struct SharedVectorIndex {
    inner: Arc<RwLock<VectorIndex>>,
}

impl SharedVectorIndex {
    /// Creates an empty shared index.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self::from_index(VectorIndex::new(dimension))
    }

    /// Wraps an existing index.
    #[must_use]
    pub fn from_index(index: VectorIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    /// Searches with shared access.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ProductId, Score)>, VectorError> {
        self.inner.read().search(query, k)
    }

    /// Inserts with exclusive access.
    pub fn insert(&self, id: ProductId, vector: &[f32]) -> Result<(), VectorError> {
        self.inner.write().insert(id, vector)
    }

    /// Inserts or replaces with exclusive access.
    pub fn upsert(&self, id: ProductId, vector: &[f32]) -> Result<bool, VectorError> {
        self.inner.write().upsert(id, vector)
    }

    /// Removes with exclusive access.
    pub fn remove(&self, id: ProductId) -> Result<bool, VectorError> {
        self.inner.write().remove(id)
    }

    /// Replaces the index contents from `source`.
    ///
    /// The replacement is built without holding the lock, so searches keep
    /// running against the old contents until the swap. On error nothing is
    /// swapped.
    pub fn rebuild<I, V>(&self, source: I) -> Result<usize, VectorError>
    where
        I: IntoIterator<Item = (ProductId, V)>,
        V: AsRef<[f32]>,
    {
        let template = {
            let guard = self.inner.read();
            VectorIndex::new(guard.dimension()).with_parallel_threshold(guard.parallel_threshold())
        };
        let fresh = template.build_from(source)?;
        let count = fresh.len();

        let mut guard = self.inner.write();
        if guard.dimension() != fresh.dimension() {
            return Err(VectorError::DimensionMismatch {
                expected: guard.dimension().get(),
                actual: fresh.dimension().get(),
            });
        }
        *guard = fresh;
        info!("Rebuilt vector index with {count} products");
        Ok(count)
    }

    /// Saves a consistent snapshot through `storage`.
    ///
    /// Holds the read lock for the duration of the write, so searches proceed
    /// while mutations wait.
    pub fn persist(&self, storage: &IndexStorage) -> Result<(), VectorError> {
        storage.save(&self.inner.read())
    }

    /// Replaces the index with the snapshot in `storage`.
    ///
    /// The snapshot must have this index's dimension. On failure the current
    /// index is left untouched and the error returned.
    pub fn load(&self, storage: &IndexStorage) -> Result<usize, VectorError> {
        let loaded = storage.load()?;
        let count = loaded.len();
        let mut guard = self.inner.write();
        if loaded.dimension() != guard.dimension() {
            return Err(VectorError::DimensionMismatch {
                expected: guard.dimension().get(),
                actual: loaded.dimension().get(),
            });
        }
        let threshold = guard.parallel_threshold();
        *guard = loaded.with_parallel_threshold(threshold);
        Ok(count)
    }

    /// Like [`load`](Self::load), but falls back to an empty index.
    ///
    /// Returns the number of loaded products; zero after a fallback.
    pub fn load_or_reset(&self, storage: &IndexStorage) -> usize {
        match self.load(storage) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to load vector index, starting empty: {e}");
                self.clear();
                0
            }
        }
    }

    /// Drops every entry, keeping the dimension and scan threshold.
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        let threshold = guard.parallel_threshold();
        *guard = VectorIndex::new(guard.dimension()).with_parallel_threshold(threshold);
    }

    /// Acquires shared access for multi-step reads.
    pub fn read(&self) -> RwLockReadGuard<'_, VectorIndex> {
        self.inner.read()
    }

    /// Number of indexed products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Checks if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// The fixed embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.inner.read().dimension()
    }
}

impl std::fmt::Debug for SharedVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Some(index) => write!(
                f,
                "SharedVectorIndex {{ dimension: {}, len: {} }}",
                index.dimension(),
                index.len()
            ),
            None => write!(f, "SharedVectorIndex {{ <locked> }}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn pid(id: u64) -> ProductId {
        ProductId::new(id)
    }

    fn shared_with(n: u64) -> SharedVectorIndex {
        let shared = SharedVectorIndex::new(VectorDimension::new(2).unwrap());
        for i in 0..n {
            let angle = i as f32 * 0.1;
            shared.insert(pid(i), &[angle.cos(), angle.sin()]).unwrap();
        }
        shared
    }

    #[test]
    fn test_clones_share_state() {
        let shared = shared_with(3);
        let other = shared.clone();

        assert!(other.remove(pid(1)).unwrap());
        assert_eq!(shared.len(), 2);
        assert!(!shared.read().contains(pid(1)));
    }

    #[test]
    fn test_rebuild_failure_keeps_state() {
        let shared = shared_with(4);
        let before = shared.read().clone();

        let result = shared.rebuild(vec![(pid(10), vec![1.0, 0.0]), (pid(11), vec![1.0])]);
        assert!(result.is_err());
        assert_eq!(*shared.read(), before);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let shared = shared_with(50);
        let query = [1.0_f32, 0.0];

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = shared.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let results = handle.search(&query, 5).unwrap();
                        assert!(results.len() <= 5);
                        for pair in results.windows(2) {
                            assert!(pair[0].1 >= pair[1].1);
                        }
                    }
                })
            })
            .collect();

        let writer = {
            let handle = shared.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    handle.remove(pid(i)).unwrap();
                    handle.insert(pid(100 + i), &[0.0, 1.0]).unwrap();
                }
            })
        };

        for reader in readers {
            reader.join().unwrap();
        }
        writer.join().unwrap();

        assert_eq!(shared.len(), 50);
        assert!(!shared.read().contains(pid(0)));
        assert!(shared.read().contains(pid(124)));
    }

    #[test]
    fn test_load_or_reset_falls_back_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStorage::new(temp_dir.path());
        let shared = shared_with(3);

        // Nothing persisted yet
        assert_eq!(shared.load_or_reset(&storage), 0);
        assert!(shared.is_empty());
        assert_eq!(shared.dimension().get(), 2);
    }

    #[test]
    fn test_clear_keeps_configuration() {
        let shared = SharedVectorIndex::from_index(
            VectorIndex::with_dimension(2).unwrap().with_parallel_threshold(7),
        );
        shared.insert(pid(1), &[1.0, 0.0]).unwrap();

        shared.clear();
        assert!(shared.is_empty());
        assert_eq!(shared.dimension().get(), 2);
        assert_eq!(shared.read().parallel_threshold(), 7);
    }

    #[test]
    fn test_persist_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = IndexStorage::new(temp_dir.path());
        let shared = shared_with(5);
        shared.persist(&storage).unwrap();

        let restored = SharedVectorIndex::new(VectorDimension::new(2).unwrap());
        assert_eq!(restored.load(&storage).unwrap(), 5);
        assert_eq!(
            restored.search(&[1.0, 0.0], 5).unwrap(),
            shared.search(&[1.0, 0.0], 5).unwrap()
        );
    }
}
