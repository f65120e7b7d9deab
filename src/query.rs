//! Query service: similarity search joined with catalog metadata.
//!
//! The service owns the search policy (result limit, similarity threshold)
//! and the admin operations that keep the index in sync with the catalog.
//! Searches never fail outright: errors degrade to an empty match list with
//! a descriptive `error` field.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, Product};
use crate::config::SearchConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::vector::{EmbeddingProvider, IndexStorage, ProductId, Score, SharedVectorIndex};

/// Default number of matches returned.
pub const DEFAULT_LIMIT: usize = 5;

/// Upper bound on the number of matches a caller may request.
pub const MAX_LIMIT: usize = 20;

/// Default minimum similarity for a match.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Result limit and similarity threshold policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchPolicy {
    pub default_limit: usize,
    pub max_limit: usize,
    pub threshold: f32,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl From<&SearchConfig> for SearchPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            threshold: config.threshold,
        }
    }
}

impl SearchPolicy {
    /// Effective limit, clamped to `1..=max_limit`.
    #[must_use]
    pub fn limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }

    /// Effective threshold, clamped to `[0, 1]`. NaN falls back to the default.
    #[must_use]
    pub fn threshold(&self, requested: Option<f32>) -> f32 {
        match requested {
            Some(t) if !t.is_nan() => t.clamp(0.0, 1.0),
            _ => self.threshold.clamp(0.0, 1.0),
        }
    }
}

/// A search hit joined with its catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMatch {
    pub product_id: ProductId,
    pub similarity_score: f32,
    pub brand: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub image_url: String,
    pub product_url: String,
}

impl ProductMatch {
    fn new(product: Product, score: Score) -> Self {
        Self {
            product_id: product.id,
            similarity_score: score.get(),
            brand: product.brand,
            name: product.name,
            category: product.category,
            description: product.description,
            price: product.price,
            currency: product.currency,
            image_url: product.image_url,
            product_url: product.product_url,
        }
    }
}

/// Outcome of a search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<ProductMatch>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    fn found(matches: Vec<ProductMatch>) -> Self {
        Self {
            message: format!("Found {} matching products", matches.len()),
            matches,
            error: None,
        }
    }

    fn failed(error: &ServiceError) -> Self {
        Self {
            matches: Vec::new(),
            message: "Error searching products".to_string(),
            error: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Snapshot of index state for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub products: usize,
    pub dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// Composes index search with catalog metadata.
pub struct QueryService {
    index: SharedVectorIndex,
    catalog: Arc<dyn CatalogStore>,
    storage: Option<IndexStorage>,
    policy: SearchPolicy,
}

impl QueryService {
    pub fn new(index: SharedVectorIndex, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            index,
            catalog,
            storage: None,
            policy: SearchPolicy::default(),
        }
    }

    /// Enables `restore`, `persist` and persisting after `resync`.
    #[must_use]
    pub fn with_storage(mut self, storage: IndexStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn index(&self) -> &SharedVectorIndex {
        &self.index
    }

    pub fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    /// Loads the persisted index, falling back to an empty one.
    ///
    /// A missing or unreadable snapshot both leave an empty index. Without
    /// storage configured this is a no-op. Returns the number of loaded
    /// products.
    pub fn restore(&self) -> usize {
        let Some(storage) = &self.storage else {
            return 0;
        };
        if !storage.exists() {
            info!(
                "No vector index at {}, starting empty",
                storage.base_path().display()
            );
            self.index.clear();
            return 0;
        }
        self.index.load_or_reset(storage)
    }

    /// Loads the persisted index, returning load errors instead of falling
    /// back.
    ///
    /// A missing snapshot still yields an empty index. On error the in-memory
    /// index is untouched and the snapshot on disk stays as it is, so it can
    /// be inspected or rebuilt.
    pub fn restore_strict(&self) -> ServiceResult<usize> {
        match &self.storage {
            Some(storage) if storage.exists() => Ok(self.index.load(storage)?),
            Some(_) => Ok(self.restore()),
            None => Ok(0),
        }
    }

    /// Searches with an embedding, degrading errors into the response.
    pub fn search_by_vector(
        &self,
        query: &[f32],
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> SearchResponse {
        match self.find_matches(query, limit, threshold) {
            Ok(matches) => SearchResponse::found(matches),
            Err(e) => {
                warn!("Search failed: {e}");
                SearchResponse::failed(&e)
            }
        }
    }

    /// Extracts an embedding from `image_path` and searches with it.
    pub fn search_by_image(
        &self,
        provider: &dyn EmbeddingProvider,
        image_path: &Path,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> SearchResponse {
        match provider.extract(image_path) {
            Ok(embedding) => self.search_by_vector(&embedding, limit, threshold),
            Err(e) => {
                let e = ServiceError::from(e);
                warn!("Feature extraction failed for {}: {e}", image_path.display());
                SearchResponse::failed(&e)
            }
        }
    }

    /// Index hits after the limit and threshold policy, without the catalog join.
    pub fn find_hits(
        &self,
        query: &[f32],
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> ServiceResult<Vec<(ProductId, Score)>> {
        let limit = self.policy.limit(limit);
        let threshold = self.policy.threshold(threshold);

        let mut hits = self.index.search(query, limit)?;
        hits.retain(|(_, score)| score.meets(threshold));
        Ok(hits)
    }

    /// Typed search: thresholded hits joined with the catalog.
    ///
    /// Hits whose product the catalog no longer knows are skipped.
    pub fn find_matches(
        &self,
        query: &[f32],
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> ServiceResult<Vec<ProductMatch>> {
        let hits = self.find_hits(query, limit, threshold)?;
        let mut matches = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            match self.catalog.product(id)? {
                Some(product) => matches.push(ProductMatch::new(product, score)),
                None => debug!("Skipping product {id}: not in catalog"),
            }
        }
        Ok(matches)
    }

    /// Adds or replaces one product embedding.
    ///
    /// Returns `true` if an existing embedding was replaced.
    pub fn index_product(&self, id: ProductId, embedding: &[f32]) -> ServiceResult<bool> {
        let replaced = self.index.upsert(id, embedding)?;
        debug!("Indexed product {id} (replaced: {replaced})");
        Ok(replaced)
    }

    pub fn remove_product(&self, id: ProductId) -> ServiceResult<bool> {
        Ok(self.index.remove(id)?)
    }

    /// Rebuilds the index from the catalog and persists it when storage is
    /// configured.
    ///
    /// All-or-nothing: on error the index keeps its previous contents.
    pub fn resync(&self) -> ServiceResult<usize> {
        self.resync_with(|_, _| {})
    }

    /// Like [`resync`](Self::resync), reporting `(done, total)` per product.
    pub fn resync_with<F>(&self, mut on_progress: F) -> ServiceResult<usize>
    where
        F: FnMut(usize, usize),
    {
        let embeddings = self.catalog.embeddings()?;
        let total = embeddings.len();
        let source = embeddings.into_iter().enumerate().map(|(done, entry)| {
            on_progress(done + 1, total);
            entry
        });
        let count = self.index.rebuild(source)?;
        if self.storage.is_some() {
            self.persist()?;
        }
        info!("Updated index with {count} products from catalog");
        Ok(count)
    }

    /// Saves the current index through the configured storage.
    pub fn persist(&self) -> ServiceResult<()> {
        let storage = self.storage.as_ref().ok_or_else(|| ServiceError::Config {
            reason: "no index storage configured".to_string(),
        })?;
        self.index.persist(storage)?;
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            products: self.index.len(),
            dimension: self.index.dimension().get(),
            path: None,
            model_name: None,
            size_bytes: None,
            created_at: None,
            updated_at: None,
        };

        if let Some(storage) = &self.storage {
            stats.path = Some(storage.base_path().to_path_buf());
            if let Ok(metadata) = storage.metadata() {
                stats.model_name = Some(metadata.model_name);
                stats.created_at = Some(metadata.created_at);
                stats.updated_at = Some(metadata.updated_at);
                stats.size_bytes = storage.file_size().ok();
            }
        }
        stats
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("index", &self.index)
            .field("storage", &self.storage)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
