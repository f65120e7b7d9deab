//! Product catalog: the authoritative source of product metadata and embeddings.
//!
//! The vector index only holds `(ProductId, embedding)` rows. Everything a
//! caller shows to a user (brand, price, image URL) comes from a
//! [`CatalogStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::vector::ProductId;

fn default_currency() -> String {
    "USD".to_string()
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    /// Identifier in the upstream e-commerce system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub brand: String,
    pub name: String,
    pub category: String,

    #[serde(default)]
    pub description: String,

    pub price: f64,

    #[serde(default = "default_currency")]
    pub currency: String,

    pub image_url: String,
    pub product_url: String,

    /// Image embedding, when the product image has been processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_vector: Option<Vec<f32>>,
}

/// Errors from catalog access.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse catalog '{path}': {reason}\nSuggestion: The catalog must be a JSON array of products")]
    Parse { path: PathBuf, reason: String },

    #[error("Product {0} appears more than once in the catalog")]
    DuplicateProduct(ProductId),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the product catalog.
pub trait CatalogStore: Send + Sync {
    /// Look up one product.
    fn product(&self, id: ProductId) -> Result<Option<Product>, CatalogError>;

    /// All products in catalog order.
    fn products(&self) -> Result<Vec<Product>, CatalogError>;

    /// `(id, embedding)` pairs for every product that has an embedding.
    ///
    /// This is the rebuild source for the vector index.
    fn embeddings(&self) -> Result<Vec<(ProductId, Vec<f32>)>, CatalogError> {
        Ok(self
            .products()?
            .into_iter()
            .filter_map(|p| p.feature_vector.map(|v| (p.id, v)))
            .collect())
    }
}

/// In-memory catalog loaded from a JSON array of products.
#[derive(Debug, Default, Clone)]
pub struct JsonCatalog {
    products: Vec<Product>,
    positions: HashMap<ProductId, usize>,
}

impl JsonCatalog {
    /// Build a catalog from products, rejecting duplicate ids.
    pub fn from_products(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut positions = HashMap::with_capacity(products.len());
        for (position, product) in products.iter().enumerate() {
            if positions.insert(product.id, position).is_some() {
                return Err(CatalogError::DuplicateProduct(product.id));
            }
        }
        Ok(Self {
            products,
            positions,
        })
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let products: Vec<Product> =
            serde_json::from_str(&content).map_err(|e| CatalogError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let catalog = Self::from_products(products)?;
        info!(
            "Loaded catalog with {} products from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl CatalogStore for JsonCatalog {
    fn product(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        Ok(self
            .positions
            .get(&id)
            .map(|&position| self.products[position].clone()))
    }

    fn products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.clone())
    }
}
