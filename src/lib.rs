//! Visual similarity search over a clothing catalog.
//!
//! The core is [`vector::VectorIndex`], an exact inner-product index over
//! unit-normalized image embeddings. [`query::QueryService`] joins its hits
//! with [`catalog::CatalogStore`] metadata and applies the search policy.

pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod query;
pub mod vector;

// Explicit exports for better API clarity
pub use catalog::{CatalogError, CatalogStore, JsonCatalog, Product};
pub use config::Settings;
pub use error::{ServiceError, ServiceResult};
pub use query::{IndexStats, ProductMatch, QueryService, SearchPolicy, SearchResponse};
pub use vector::{
    EmbeddingProvider, IndexStorage, ProductId, Score, SharedVectorIndex, VectorDimension,
    VectorError, VectorIndex,
};
