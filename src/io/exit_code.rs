//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - the index is corrupt and must be rebuilt
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::catalog::CatalogError;
use crate::error::ServiceError;
use crate::vector::VectorError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Entity not found but command executed successfully (code 3)
    NotFound = 3,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Malformed vector, dimension mismatch or duplicate id (code 7)
    InvalidInput = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Convert a `ServiceError` to the appropriate exit code.
    pub fn from_error(error: &ServiceError) -> Self {
        match error {
            ServiceError::ProductNotFound(_) => ExitCode::NotFound,

            // Corruption is a blocking error
            ServiceError::Index(VectorError::CorruptIndex { .. })
            | ServiceError::Index(VectorError::VersionMismatch { .. }) => ExitCode::BlockingError,

            ServiceError::Index(VectorError::Storage(_))
            | ServiceError::Catalog(CatalogError::Read { .. }) => ExitCode::IoError,

            ServiceError::Index(
                VectorError::DimensionMismatch { .. }
                | VectorError::InvalidDimension { .. }
                | VectorError::DuplicateId(_)
                | VectorError::InvalidVector { .. },
            )
            | ServiceError::InvalidInput { .. } => ExitCode::InvalidInput,

            ServiceError::Config { .. } => ExitCode::ConfigError,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::InvalidInput => "Invalid input",
        }
    }
}
