//! Service-level error type.
//!
//! Layer errors (`VectorError`, `CatalogError`) stay typed in their own
//! modules. `ServiceError` wraps them for the query service and the CLI,
//! adding stable status codes and recovery suggestions.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::vector::{ProductId, VectorError};

/// Main error type for service operations
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Vector index errors
    #[error(transparent)]
    Index(#[from] VectorError),

    /// Catalog errors
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Product {0} is not in the index")]
    ProductNotFound(ProductId),

    /// Malformed caller input (vector literals, files)
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl ServiceError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Index(e) => match e {
                VectorError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
                VectorError::InvalidDimension { .. } => "INVALID_DIMENSION",
                VectorError::DuplicateId(_) => "DUPLICATE_ID",
                VectorError::InvalidVector { .. } => "INVALID_VECTOR",
                VectorError::InvalidScore { .. } => "INVALID_SCORE",
                VectorError::CorruptIndex { .. } => "INDEX_CORRUPTED",
                VectorError::Storage(_) => "IO_ERROR",
                VectorError::Serialization(_) => "SERIALIZATION_ERROR",
                VectorError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
                VectorError::VersionMismatch { .. } => "VERSION_MISMATCH",
            },
            Self::Catalog(e) => match e {
                CatalogError::Read { .. } => "CATALOG_READ_ERROR",
                CatalogError::Parse { .. } => "CATALOG_PARSE_ERROR",
                CatalogError::DuplicateProduct(_) => "CATALOG_DUPLICATE",
                CatalogError::Unavailable(_) => "CATALOG_UNAVAILABLE",
            },
            Self::Config { .. } => "CONFIG_ERROR",
            Self::ProductNotFound(_) => "NOT_FOUND",
            Self::InvalidInput { .. } => "INVALID_INPUT",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Index(VectorError::CorruptIndex { .. } | VectorError::VersionMismatch { .. }) => {
                vec![
                    "Run 'stylematch rebuild --catalog <file>' to rebuild from the catalog",
                    "Check for disk errors or filesystem corruption",
                ]
            }
            Self::Index(VectorError::DimensionMismatch { .. }) => vec![
                "Check that [index] dimension matches the embedding model",
                "Vectors from different models cannot share an index",
            ],
            Self::Index(VectorError::DuplicateId(_)) => vec![
                "Pass --upsert to replace the existing embedding",
                "Remove the product first with 'stylematch remove <id>'",
            ],
            Self::Index(VectorError::EmbeddingFailed(_)) => vec![
                "Check that the image exists and is a supported format",
                "The model is downloaded on first use and needs network access",
            ],
            Self::Index(VectorError::Storage(_)) => vec![
                "Check disk space and permissions in the index directory",
            ],
            Self::Catalog(_) => vec![
                "Check the [catalog] path in .stylematch/settings.toml",
                "The catalog must be a JSON array of products with unique ids",
            ],
            Self::Config { .. } => vec![
                "Run 'stylematch init --force' to regenerate the configuration",
            ],
            Self::ProductNotFound(_) => vec!["Run 'stylematch stats' to inspect the index"],
            _ => vec![],
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
