//! CLI entry point for stylematch.
//!
//! Provides commands for maintaining the product vector index and querying it
//! by embedding or by image. `insert`, `remove` and `stats` refuse to run on a
//! snapshot that fails to load (exit code 2), so a damaged index is never
//! overwritten by an incremental change. `search` and `rebuild` fall back to
//! an empty index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use console::style;
use serde::Serialize;
use tracing::debug;

use stylematch::catalog::{CatalogStore, JsonCatalog};
use stylematch::display::{
    TableBuilder, create_matches_table, create_progress_bar, create_spinner, create_stats_table,
};
use stylematch::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use stylematch::vector::{ClipEmbeddingProvider, EmbeddingProvider, l2_normalize};
use stylematch::{
    IndexStorage, ProductId, QueryService, SearchPolicy, ServiceError, ServiceResult, Settings,
    SharedVectorIndex, VectorIndex,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Visual similarity search for clothing catalogs
#[derive(Parser)]
#[command(
    name = "stylematch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Visual similarity search for clothing catalogs",
    long_about = "Maintain a vector index of product image embeddings and find visually similar products.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show detailed loading information
    #[arg(long, global = true)]
    info: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where a query or product embedding comes from.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct VectorSource {
    /// Embedding as comma separated floats
    #[arg(long, allow_hyphen_values = true)]
    vector: Option<String>,

    /// File holding the embedding (JSON array or whitespace/comma separated floats)
    #[arg(long)]
    vector_file: Option<PathBuf>,
}

/// Where a search query comes from.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct QuerySource {
    /// Embedding as comma separated floats
    #[arg(long, allow_hyphen_values = true)]
    vector: Option<String>,

    /// File holding the query embedding
    #[arg(long)]
    vector_file: Option<PathBuf>,

    /// Image to embed with the CLIP model
    #[arg(long)]
    image: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .stylematch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Add a product embedding
    #[command(
        about = "Add a product embedding to the index",
        after_help = "Examples:\n  stylematch insert 42 --vector 0.12,-0.03,...\n  stylematch insert 42 --vector-file emb.json --upsert"
    )]
    Insert {
        /// Product id
        id: ProductId,

        #[command(flatten)]
        source: VectorSource,

        /// Replace the embedding if the product is already indexed
        #[arg(long)]
        upsert: bool,

        /// L2-normalize the embedding before inserting
        #[arg(long)]
        normalize: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove a product from the index
    #[command(about = "Remove a product embedding (rebuilds the index)")]
    Remove {
        /// Product id
        id: ProductId,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find similar products
    #[command(
        about = "Find visually similar products",
        after_help = "Examples:\n  stylematch search --image photo.jpg\n  stylematch search --vector-file query.json -k 10 --threshold 0.3 --json"
    )]
    Search {
        #[command(flatten)]
        query: QuerySource,

        /// Maximum number of results (clamped to the configured maximum)
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Minimum similarity score (0.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the index from the catalog
    #[command(about = "Rebuild the index from catalog embeddings")]
    Rebuild {
        /// Catalog file (overrides [catalog] path)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Show progress during the rebuild
        #[arg(short, long)]
        progress: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics
    #[command(about = "Show index statistics")]
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .stylematch/settings.toml")]
    Config,
}

impl Commands {
    fn output_format(&self) -> OutputFormat {
        let json = match self {
            Commands::Insert { json, .. }
            | Commands::Remove { json, .. }
            | Commands::Search { json, .. }
            | Commands::Rebuild { json, .. }
            | Commands::Stats { json } => *json,
            Commands::Init { .. } | Commands::Config => false,
        };
        OutputFormat::from_json_flag(json)
    }
}

#[derive(Debug, Serialize)]
struct MutationReport {
    product_id: ProductId,
    products: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    replaced: Option<bool>,
}

#[derive(Debug, Serialize)]
struct HitReport {
    product_id: ProductId,
    similarity_score: f32,
}

fn main() {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(config_path) => match Settings::load_from(config_path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "Configuration error loading from {}: {e}",
                    config_path.display()
                );
                std::process::exit(ExitCode::ConfigError.into());
            }
        },
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };

    init_tracing(&cli, &settings);

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.search.parallel_threads)
        .build_global()
    {
        debug!("Using existing rayon pool: {e}");
    }

    let format = cli.command.output_format();
    let code = match run(cli.command, settings) {
        Ok(code) => code,
        Err(e) => report_error(&e, format),
    };
    std::process::exit(code.into());
}

fn init_tracing(cli: &Cli, settings: &Settings) {
    let level = if cli.verbose || settings.debug {
        tracing::Level::DEBUG
    } else if cli.info {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(error: &ServiceError, format: OutputFormat) -> ExitCode {
    let code = ExitCode::from_error(error);
    if format.is_json() {
        let response = JsonResponse::from_error(error).with_meta(ResponseMeta::now());
        print_json(&response);
    } else {
        eprintln!("{} {error}", style("Error:").red().bold());
        for suggestion in error.recovery_suggestions() {
            eprintln!("  {} {suggestion}", style("→").dim());
        }
    }
    code
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

fn run(command: Commands, settings: Settings) -> ServiceResult<ExitCode> {
    let format = command.output_format();

    match command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| ServiceError::Config {
                reason: e.to_string(),
            })?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            let toml_str = toml::to_string_pretty(&settings).map_err(|e| ServiceError::Config {
                reason: e.to_string(),
            })?;
            println!("{toml_str}");
            Ok(ExitCode::Success)
        }

        Commands::Insert {
            id,
            source,
            upsert,
            normalize,
            ..
        } => {
            let mut vector = read_vector(source.vector.as_deref(), source.vector_file.as_deref())?;
            if normalize {
                l2_normalize(&mut vector);
            }

            let service = open_service(&settings, None, true)?;
            let replaced = if upsert {
                Some(service.index_product(id, &vector)?)
            } else {
                service.index().insert(id, &vector)?;
                None
            };
            service.persist()?;

            let report = MutationReport {
                product_id: id,
                products: service.index().len(),
                replaced,
            };
            let message = match replaced {
                Some(true) => format!("Replaced embedding of product {id}"),
                _ => format!("Indexed product {id}"),
            };
            emit(format, report, &message, |r| {
                format!(
                    "{} {message} ({} products in index)",
                    style("✓").green(),
                    r.products
                )
            });
            Ok(ExitCode::Success)
        }

        Commands::Remove { id, .. } => {
            let service = open_service(&settings, None, true)?;
            if !service.remove_product(id)? {
                return Err(ServiceError::ProductNotFound(id));
            }
            service.persist()?;

            let report = MutationReport {
                product_id: id,
                products: service.index().len(),
                replaced: None,
            };
            let message = format!("Removed product {id}");
            emit(format, report, &message, |r| {
                format!(
                    "{} {message} ({} products in index)",
                    style("✓").green(),
                    r.products
                )
            });
            Ok(ExitCode::Success)
        }

        Commands::Search {
            query,
            limit,
            threshold,
            ..
        } => {
            let service = open_service(&settings, None, false)?;

            let query = match query.image {
                Some(image) => embed_image(&settings, &image, format)?,
                None => read_vector(query.vector.as_deref(), query.vector_file.as_deref())?,
            };

            if settings.catalog.path.is_some() {
                let matches = service.find_matches(&query, limit, threshold)?;
                let message = format!("Found {} matching products", matches.len());
                let code = if matches.is_empty() {
                    ExitCode::NotFound
                } else {
                    ExitCode::Success
                };
                emit(format, matches, &message, |m| {
                    if m.is_empty() {
                        message.clone()
                    } else {
                        format!("{}\n{message}", create_matches_table(m))
                    }
                });
                Ok(code)
            } else {
                // No catalog to join with: report raw index hits
                let hits: Vec<HitReport> = service
                    .find_hits(&query, limit, threshold)?
                    .into_iter()
                    .map(|(product_id, score)| HitReport {
                        product_id,
                        similarity_score: score.get(),
                    })
                    .collect();
                let message = format!("Found {} matching products", hits.len());
                let code = if hits.is_empty() {
                    ExitCode::NotFound
                } else {
                    ExitCode::Success
                };
                emit(format, hits, &message, |h| {
                    let mut table = TableBuilder::new().set_headers(vec!["#", "Product", "Score"]);
                    for (rank, hit) in h.iter().enumerate() {
                        table = table.add_row(vec![
                            (rank + 1).to_string(),
                            hit.product_id.to_string(),
                            format!("{:.4}", hit.similarity_score),
                        ]);
                    }
                    format!("{}\n{message}", table.build())
                });
                Ok(code)
            }
        }

        Commands::Rebuild {
            catalog, progress, ..
        } => {
            if catalog.is_none() && settings.catalog.path.is_none() {
                return Err(ServiceError::Config {
                    reason: "no catalog configured; pass --catalog or set [catalog] path"
                        .to_string(),
                });
            }

            let service = open_service(&settings, catalog.as_deref(), false)?;
            let bar = progress.then(|| create_progress_bar(0, "Indexing catalog embeddings"));
            let count = service.resync_with(|done, total| {
                if let Some(bar) = &bar {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                }
            })?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            let stats = service.stats();
            let message = format!("Rebuilt index with {count} products");
            emit(format, stats, &message, |_| {
                format!("{} {message}", style("✓").green())
            });
            Ok(ExitCode::Success)
        }

        Commands::Stats { .. } => {
            let service = open_service(&settings, None, true)?;
            let stats = service.stats();
            let message = format!("{} products indexed", stats.products);
            emit(format, stats, &message, create_stats_table);
            Ok(ExitCode::Success)
        }
    }
}

/// Prints `data` as a JSON envelope or as text rendered by `render`.
fn emit<T, F>(format: OutputFormat, data: T, message: &str, render: F)
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    if format.is_json() {
        let response = JsonResponse::success(data)
            .with_message(message)
            .with_meta(ResponseMeta::now());
        print_json(&response);
    } else {
        println!("{}", render(&data));
    }
}

/// Builds the query service from settings and loads the persisted index.
///
/// With `strict`, a snapshot that fails to load is reported instead of being
/// replaced by an empty index.
fn open_service(
    settings: &Settings,
    catalog_override: Option<&Path>,
    strict: bool,
) -> ServiceResult<QueryService> {
    let dimension = settings.dimension()?;

    let catalog: Arc<dyn CatalogStore> = match catalog_override.or(settings.catalog.path.as_deref())
    {
        Some(path) => Arc::new(JsonCatalog::load(path)?),
        None => Arc::new(JsonCatalog::default()),
    };

    let index = SharedVectorIndex::from_index(
        VectorIndex::new(dimension).with_parallel_threshold(settings.index.parallel_threshold),
    );
    let storage = IndexStorage::new(&settings.index_path).with_model_name(&settings.index.model);
    let service = QueryService::new(index, catalog)
        .with_storage(storage)
        .with_policy(SearchPolicy::from(&settings.search));

    let loaded = if strict {
        service.restore_strict()?
    } else {
        service.restore()
    };
    debug!(
        "Opened index at {} with {loaded} products",
        settings.index_path.display()
    );
    Ok(service)
}

fn embed_image(settings: &Settings, image: &Path, format: OutputFormat) -> ServiceResult<Vec<f32>> {
    let spinner = (!format.is_json()).then(|| create_spinner("Loading image model"));
    let provider = ClipEmbeddingProvider::new(&settings.index.model_cache, false);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let provider = provider?;

    if provider.dimension() != settings.dimension()? {
        return Err(ServiceError::Config {
            reason: format!(
                "model produces {}-dimensional embeddings but the index uses {}",
                provider.dimension(),
                settings.index.dimension
            ),
        });
    }
    Ok(provider.extract(image)?)
}

/// Reads an embedding from a flag value or a file.
fn read_vector(literal: Option<&str>, file: Option<&Path>) -> ServiceResult<Vec<f32>> {
    let parsed = match (literal, file) {
        (Some(text), _) => parse_vector(text),
        (None, Some(path)) => read_vector_file(path),
        (None, None) => Err(anyhow::anyhow!("no embedding given")),
    };
    parsed.map_err(|e| ServiceError::InvalidInput {
        reason: format!("{e:#}"),
    })
}

fn read_vector_file(path: &Path) -> anyhow::Result<Vec<f32>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
    } else {
        parse_vector(trimmed).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn parse_vector(text: &str) -> anyhow::Result<Vec<f32>> {
    let values = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>()
                .with_context(|| format!("'{part}' is not a number"))
        })
        .collect::<anyhow::Result<Vec<f32>>>()?;
    anyhow::ensure!(!values.is_empty(), "embedding is empty");
    Ok(values)
}
