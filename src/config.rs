//! Configuration module for stylematch.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SM_` and use double underscores
//! to separate nested levels:
//! - `SM_SEARCH__THRESHOLD=0.7` sets `search.threshold`
//! - `SM_INDEX__PARALLEL_THRESHOLD=4096` sets `index.parallel_threshold`
//! - `SM_CATALOG__PATH=data/catalog.json` sets `catalog.path`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vector::{DEFAULT_MODEL_NAME, DEFAULT_PARALLEL_THRESHOLD, VECTOR_DIMENSION_512, VectorDimension, VectorError};

/// Directory holding settings, index and model cache.
pub const CONFIG_DIR: &str = ".stylematch";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Vector index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Search policy settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Product catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Embedding dimension (512 for CLIP ViT-B/32)
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Image embedding model
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory for downloaded model files
    #[serde(default = "default_model_cache")]
    pub model_cache: PathBuf,

    /// Row count at which search scans in parallel
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Matches returned when no limit is given
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Largest accepted limit
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Minimum similarity score (0.0 to 1.0)
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Number of threads for parallel search
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CatalogConfig {
    /// JSON catalog file used by `rebuild` and to enrich search results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index")
}
fn default_false() -> bool {
    false
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_512
}
fn default_model() -> String {
    DEFAULT_MODEL_NAME.to_string()
}
fn default_model_cache() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("models")
}
fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}
fn default_limit() -> usize {
    crate::query::DEFAULT_LIMIT
}
fn default_max_limit() -> usize {
    crate::query::MAX_LIMIT
}
fn default_threshold() -> f32 {
    crate::query::DEFAULT_THRESHOLD
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            debug: false,
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            model: default_model(),
            model_cache: default_model_cache(),
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            threshold: default_threshold(),
            parallel_threads: default_parallel_threads(),
        }
    }
}

/// Environment layer: `SM_A__B` sets `a.b`.
fn env_provider() -> Env {
    Env::prefixed("SM_").map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.stylematch` directory
    /// from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Validated embedding dimension
    pub fn dimension(&self) -> Result<VectorDimension, VectorError> {
        VectorDimension::new(self.index.dimension)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments in the current
    /// directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(&std::env::current_dir()?, force)
    }

    /// Create a default settings file under `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# stylematch configuration file

# Version of the configuration schema
version = 1

# Path to the index directory (relative to the working directory)
index_path = ".stylematch/index"

# Global debug mode
debug = false

[index]
# Embedding dimension; must match the model (CLIP ViT-B/32 produces 512)
dimension = {VECTOR_DIMENSION_512}

# Image embedding model
model = "{DEFAULT_MODEL_NAME}"

# Where downloaded model files are cached
model_cache = ".stylematch/models"

# Search scans rows in parallel once the index holds this many products
parallel_threshold = {DEFAULT_PARALLEL_THRESHOLD}

[search]
# Matches returned when no limit is given
default_limit = 5

# Largest accepted limit
max_limit = 20

# Minimum similarity score (0.0 to 1.0)
threshold = 0.5

# Number of threads for parallel search (defaults to CPU count)
# parallel_threads = {}

[catalog]
# JSON array of products used by 'stylematch rebuild' and to enrich results
# path = "catalog.json"
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}
