//! Image embedding providers.
//!
//! The index never calls a provider itself. Callers chain
//! `extract -> search`, see [`crate::query::QueryService::search_by_image`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};

use crate::vector::types::{VectorDimension, VectorError, l2_normalize};

/// Produces a unit-normalized embedding for an image file.
///
/// Implementations must be thread-safe; the query service shares one
/// provider across requests.
pub trait EmbeddingProvider: Send + Sync {
    /// Extract the embedding of the image at `image_path`.
    ///
    /// # Errors
    /// Returns `EmbeddingFailed` if the image cannot be read or the model
    /// fails.
    fn extract(&self, image_path: &Path) -> Result<Vec<f32>, VectorError>;

    /// Dimension of the embeddings this provider produces.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// CLIP ViT-B/32 image encoder backed by fastembed.
///
/// Produces 512-dimensional embeddings.
pub struct ClipEmbeddingProvider {
    model: Mutex<ImageEmbedding>,
    dimension: VectorDimension,
}

impl ClipEmbeddingProvider {
    /// Load the model, downloading it into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(cache_dir: impl Into<PathBuf>, show_download_progress: bool) -> Result<Self, VectorError> {
        let model = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.into())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize image model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension: VectorDimension::dimension_512(),
        })
    }
}

impl EmbeddingProvider for ClipEmbeddingProvider {
    fn extract(&self, image_path: &Path) -> Result<Vec<f32>, VectorError> {
        if !image_path.is_file() {
            return Err(VectorError::EmbeddingFailed(format!(
                "Image not found: {}",
                image_path.display()
            )));
        }

        let mut embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(vec![image_path], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Failed to embed image: {e}")))?;

        let mut embedding = embeddings
            .pop()
            .ok_or_else(|| VectorError::EmbeddingFailed("Model returned no embedding".to_string()))?;

        self.dimension.validate_finite(&embedding)?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Mock provider for testing.
///
/// Derives a deterministic unit vector from the file name, so two paths with
/// the same name embed identically.
#[cfg(test)]
pub struct MockEmbeddingProvider {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEmbeddingProvider {
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn extract(&self, image_path: &Path) -> Result<Vec<f32>, VectorError> {
        let name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VectorError::EmbeddingFailed("path has no file name".to_string()))?;
        if name.starts_with("broken") {
            return Err(VectorError::EmbeddingFailed(format!(
                "cannot decode {name}"
            )));
        }

        let dim = self.dimension.get();
        let mut embedding = vec![0.1; dim];
        for (i, byte) in name.bytes().enumerate() {
            embedding[i % dim] += f32::from(byte) / 255.0;
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
