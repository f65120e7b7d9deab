//! Exact inner-product index over product embeddings.
//!
//! Embeddings live in a single row-major matrix; row `i` belongs to `ids[i]`.
//! Search is brute force over every row, which is exact and adequate at
//! catalog scale (thousands to low millions of products).
//!
//! # Removal
//! There is no incremental delete. `remove` copies every surviving row into a
//! fresh index and swaps it in, so its cost is O(N·D). Callers should treat
//! removal and rebuild as maintenance operations, not request-path work.

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::vector::types::{
    ProductId, Score, VectorDimension, VectorError, inner_product,
};

/// Row count at which `search` switches to a parallel scan.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 8_192;

/// In-memory exact nearest-neighbor index keyed by product id.
///
/// Invariants:
/// - `data.len() == ids.len() * dimension`
/// - every id appears exactly once in `ids`
/// - `positions[ids[i]] == i`
#[derive(Debug, Clone)]
pub struct VectorIndex {
    /// Fixed embedding dimension.
    dimension: VectorDimension,

    /// Product id of each row, in insertion order.
    ids: Vec<ProductId>,

    /// Row-major embedding matrix.
    data: Vec<f32>,

    /// Reverse lookup from product id to row.
    positions: HashMap<ProductId, usize>,

    /// Row count at which scoring runs on the rayon pool.
    parallel_threshold: usize,
}

impl PartialEq for VectorIndex {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension && self.ids == other.ids && self.data == other.data
    }
}

impl VectorIndex {
    /// Creates an empty index for vectors of `dimension` components.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self::with_capacity(dimension, 0)
    }

    /// Creates an empty index from a raw dimension.
    ///
    /// Fails with `InvalidDimension` when `dimension` is zero.
    pub fn with_dimension(dimension: usize) -> Result<Self, VectorError> {
        Ok(Self::new(VectorDimension::new(dimension)?))
    }

    /// Creates an empty index with room for `rows` embeddings.
    #[must_use]
    pub fn with_capacity(dimension: VectorDimension, rows: usize) -> Self {
        Self {
            dimension,
            ids: Vec::with_capacity(rows),
            data: Vec::with_capacity(rows * dimension.get()),
            positions: HashMap::with_capacity(rows),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Sets the row count at which searches run in parallel.
    #[must_use]
    pub fn with_parallel_threshold(mut self, rows: usize) -> Self {
        self.parallel_threshold = rows.max(1);
        self
    }

    /// Assembles an index from an id list and a row-major matrix.
    ///
    /// Used when loading persisted artifacts. Fails with `CorruptIndex` if
    /// the matrix size disagrees with the id count or an id repeats.
    pub fn from_parts(
        dimension: VectorDimension,
        ids: Vec<ProductId>,
        data: Vec<f32>,
    ) -> Result<Self, VectorError> {
        if data.len() != ids.len() * dimension.get() {
            return Err(VectorError::corrupt(format!(
                "matrix holds {} values but {} ids x {} dimensions were expected",
                data.len(),
                ids.len(),
                dimension
            )));
        }

        let mut positions = HashMap::with_capacity(ids.len());
        for (row, id) in ids.iter().enumerate() {
            if positions.insert(*id, row).is_some() {
                return Err(VectorError::corrupt(format!(
                    "product {id} appears more than once in the id list"
                )));
            }
        }

        Ok(Self {
            dimension,
            ids,
            data,
            positions,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        })
    }

    /// Appends an embedding for a new product.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `vector` has the wrong length
    /// - `InvalidVector` if a component is NaN or infinite
    /// - `DuplicateId` if `id` is already live; the index is unchanged
    pub fn insert(&mut self, id: ProductId, vector: &[f32]) -> Result<(), VectorError> {
        self.dimension.validate_finite(vector)?;
        if self.positions.contains_key(&id) {
            return Err(VectorError::DuplicateId(id));
        }
        self.push_row(id, vector);
        Ok(())
    }

    /// Inserts or replaces the embedding for `id`.
    ///
    /// A replaced embedding keeps its row position. Returns `true` if an
    /// existing embedding was replaced.
    pub fn upsert(&mut self, id: ProductId, vector: &[f32]) -> Result<bool, VectorError> {
        self.dimension.validate_finite(vector)?;
        match self.positions.get(&id) {
            Some(&row) => {
                self.row_mut(row).copy_from_slice(vector);
                Ok(true)
            }
            None => {
                self.push_row(id, vector);
                Ok(false)
            }
        }
    }

    /// Removes the embedding for `id` by rebuilding the index without it.
    ///
    /// Returns `false` and leaves the index untouched if `id` is absent.
    /// Removing the last entry leaves a valid empty index.
    pub fn remove(&mut self, id: ProductId) -> Result<bool, VectorError> {
        let Some(&target) = self.positions.get(&id) else {
            return Ok(false);
        };

        let survivors = self.len() - 1;
        let mut fresh = Self::with_capacity(self.dimension, survivors)
            .with_parallel_threshold(self.parallel_threshold);
        for (row, (row_id, vector)) in self.entries().enumerate() {
            if row != target {
                fresh.push_row(row_id, vector);
            }
        }

        debug!("Removed product {id}; rebuilt index with {survivors} entries");
        *self = fresh;
        Ok(true)
    }

    /// Returns the `k` most similar products to `query`.
    ///
    /// Results are ordered by descending inner product; equal scores are
    /// ordered by ascending row, so earlier insertions rank first. An empty
    /// index or `k == 0` yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ProductId, Score)>, VectorError> {
        self.dimension.validate_finite(query)?;

        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored = self.score_rows(query);
        let ranking = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, ranking);
            scored.truncate(k);
        }
        scored.sort_unstable_by(ranking);

        scored
            .into_iter()
            .map(|(row, score)| Ok((self.ids[row], Score::new(score)?)))
            .collect()
    }

    /// Replaces the whole index with the entries of `source`.
    ///
    /// All-or-nothing: the new contents are built aside and swapped in only
    /// if every entry is valid. On error the previous state is kept.
    /// Returns the number of entries now indexed.
    pub fn rebuild<I, V>(&mut self, source: I) -> Result<usize, VectorError>
    where
        I: IntoIterator<Item = (ProductId, V)>,
        V: AsRef<[f32]>,
    {
        let fresh = self.build_from(source)?;
        let count = fresh.len();
        *self = fresh;
        Ok(count)
    }

    /// Builds a new index with this index's configuration from `source`.
    pub(crate) fn build_from<I, V>(&self, source: I) -> Result<Self, VectorError>
    where
        I: IntoIterator<Item = (ProductId, V)>,
        V: AsRef<[f32]>,
    {
        let source = source.into_iter();
        let mut fresh = Self::with_capacity(self.dimension, source.size_hint().0)
            .with_parallel_threshold(self.parallel_threshold);
        for (id, vector) in source {
            fresh.insert(id, vector.as_ref())?;
        }
        Ok(fresh)
    }

    /// Returns the embedding stored for `id`.
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&[f32]> {
        self.positions.get(&id).map(|&row| self.row(row))
    }

    /// Checks whether `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: ProductId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Iterates `(id, embedding)` pairs in row order.
    pub fn entries(&self) -> impl Iterator<Item = (ProductId, &[f32])> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.dimension.get()))
    }

    /// Product ids in row order.
    #[must_use]
    pub fn ids(&self) -> &[ProductId] {
        &self.ids
    }

    /// The row-major embedding matrix.
    #[must_use]
    pub fn as_matrix(&self) -> &[f32] {
        &self.data
    }

    /// Number of indexed products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Checks if the index holds no products.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The fixed embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Row count at which searches run in parallel.
    #[must_use]
    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    fn push_row(&mut self, id: ProductId, vector: &[f32]) {
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        self.data.extend_from_slice(vector);
    }

    fn row(&self, row: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.data[row * dim..(row + 1) * dim]
    }

    fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let dim = self.dimension.get();
        &mut self.data[row * dim..(row + 1) * dim]
    }

    fn score_rows(&self, query: &[f32]) -> Vec<(usize, f32)> {
        let dim = self.dimension.get();
        if self.len() >= self.parallel_threshold {
            self.data
                .par_chunks_exact(dim)
                .enumerate()
                .map(|(row, vector)| (row, row_score(query, vector)))
                .collect()
        } else {
            self.data
                .chunks_exact(dim)
                .enumerate()
                .map(|(row, vector)| (row, row_score(query, vector)))
                .collect()
        }
    }
}

/// Inner product of one row; an undefined product (`inf - inf`) ranks last.
#[inline]
fn row_score(query: &[f32], vector: &[f32]) -> f32 {
    let score = inner_product(query, vector);
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
