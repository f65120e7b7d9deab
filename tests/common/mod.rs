//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;

use rand::{Rng, SeedableRng, rngs::StdRng};
use stylematch::vector::{EmbeddingProvider, VectorDimension, VectorError, l2_normalize};
use stylematch::{Product, ProductId};

pub fn pid(id: u64) -> ProductId {
    ProductId::new(id)
}

/// Deterministic random unit vectors.
pub fn random_unit_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
            l2_normalize(&mut v);
            v
        })
        .collect()
}

pub fn product(id: u64, brand: &str, name: &str, vector: Option<Vec<f32>>) -> Product {
    Product {
        id: pid(id),
        external_id: Some(format!("clothing_{id}")),
        brand: brand.to_string(),
        name: name.to_string(),
        category: "apparel".to_string(),
        description: format!("{brand} {name}"),
        price: 25.0 + id as f64,
        currency: "USD".to_string(),
        image_url: format!("https://img.example.com/{id}.jpg"),
        product_url: format!("https://shop.example.com/p/{id}"),
        feature_vector: vector,
    }
}

/// Writes `products` as a JSON catalog file.
pub fn write_catalog(path: &Path, products: &[Product]) {
    let json = serde_json::to_string_pretty(products).expect("serialize catalog");
    std::fs::write(path, json).expect("write catalog");
}

/// Provider that maps known file names to fixed embeddings.
pub struct FixedProvider {
    pub dimension: VectorDimension,
    pub embeddings: Vec<(&'static str, Vec<f32>)>,
}

impl EmbeddingProvider for FixedProvider {
    fn extract(&self, image_path: &Path) -> Result<Vec<f32>, VectorError> {
        let name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.embeddings
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| VectorError::EmbeddingFailed(format!("cannot read {name}")))
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
