//! Command implementations for the lookalike CLI.
//!
//! Every command loads settings the same way (defaults -> config file ->
//! env -> CLI flags), initializes logging, then wires up the engine it
//! needs. Commands that embed images load the vision model; the rest run
//! with a disabled extractor so they stay fast and work in lean builds.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use lookalike_embeddings::{DisabledExtractor, FeatureExtractor, HttpImageFetcher};
use lookalike_engine::{EngineConfig, GenerateOptions, QueryOptions, RecommendationEngine};
use lookalike_storage::EmbeddingStore;
use lookalike_types::{IndexBackend, ProductSource, Settings};
use lookalike_vector::{FlatIndex, VectorIndex};

use crate::cli::{Cli, Commands, ConfigCommands, EmbedArgs, GenerateArgs, SimilarArgs};

/// Load settings, apply CLI overrides, and dispatch the command
pub async fn execute(cli: Cli) -> Result<()> {
    // Init runs before loading: the config file may not exist yet
    if let Commands::Config {
        command: ConfigCommands::Init { force },
    } = &cli.command
    {
        return config_init(cli.config.as_deref(), *force);
    }

    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level.as_deref() {
        settings.log_level = level.to_string();
    }
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_logging(&settings)?;

    match cli.command {
        Commands::Generate(args) => generate(&settings, args).await,
        Commands::Rebuild => rebuild(&settings),
        Commands::Similar(args) => similar(&settings, args).await,
        Commands::Embed(args) => embed(&settings, args).await,
        Commands::Remove { product_id } => remove(&settings, &product_id).await,
        Commands::Stats { json } => stats(&settings, json),
        Commands::Products { json } => products(&settings, json),
        // Init was handled before settings were loaded, so only Show is left
        Commands::Config { .. } => config_show(&settings),
    }
}

fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

#[cfg(feature = "vision")]
fn load_extractor() -> Result<Arc<dyn FeatureExtractor>> {
    let extractor = lookalike_embeddings::ResnetExtractor::load_default()
        .context("Failed to load the embedding model")?;
    Ok(Arc::new(extractor))
}

#[cfg(not(feature = "vision"))]
fn load_extractor() -> Result<Arc<dyn FeatureExtractor>> {
    bail!(
        "vision support is not available: this binary was built without \
         the vision feature; rebuild with `--features vision`"
    )
}

fn open_index(settings: &Settings) -> Result<Box<dyn VectorIndex>> {
    let index_dir = settings.expanded_index_dir();
    match settings.index_backend {
        IndexBackend::Flat => {
            let index = FlatIndex::open_or_create(settings.embedding_dimension, &index_dir)
                .context("Failed to open vector index")?;
            Ok(Box::new(index))
        }
        #[cfg(feature = "hnsw")]
        IndexBackend::Hnsw => {
            let config =
                lookalike_vector::HnswConfig::new(settings.embedding_dimension, &index_dir);
            let index = lookalike_vector::HnswIndex::open_or_create(config)
                .context("Failed to open vector index")?;
            Ok(Box::new(index))
        }
        #[cfg(not(feature = "hnsw"))]
        IndexBackend::Hnsw => bail!(
            "hnsw support is not available: this binary was built without \
             the hnsw feature; rebuild with `--features hnsw` or set \
             index_backend = \"flat\""
        ),
    }
}

/// Open the store and index and assemble the engine. `with_model` loads
/// the real feature extractor; without it, commands that try to embed get
/// a capability error instead.
fn build_engine(settings: &Settings, with_model: bool) -> Result<RecommendationEngine> {
    let extractor: Arc<dyn FeatureExtractor> = if with_model {
        load_extractor()?
    } else {
        Arc::new(DisabledExtractor::new())
    };

    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store =
        Arc::new(EmbeddingStore::open(&db_path).context("Failed to open embedding store")?);

    let index = open_index(settings)?;
    let fetcher = Arc::new(
        HttpImageFetcher::new(settings.fetch.clone()).context("Failed to build image fetcher")?,
    );
    let config = EngineConfig {
        model_version: settings.model_version.clone(),
        index_dir: settings.expanded_index_dir(),
        cache: settings.cache.clone(),
    };

    Ok(RecommendationEngine::new(
        store, extractor, fetcher, index, config,
    ))
}

async fn generate(settings: &Settings, args: GenerateArgs) -> Result<()> {
    let products = ProductSource::load_manifest(&args.manifest)
        .with_context(|| format!("Failed to read manifest {:?}", args.manifest))?;
    println!(
        "Loaded {} products from {}",
        products.len(),
        args.manifest.display()
    );

    let engine = build_engine(settings, true)?;
    let options = GenerateOptions {
        batch_size: args.batch_size,
        rebuild: args.rebuild,
        category: args.category,
        limit: args.limit,
        model_version: args.model_version,
    };
    let stats = engine.generate(&products, &options).await?;

    for failure in &stats.failures {
        println!("  failed {}: {}", failure.product_id, failure.reason);
    }
    println!(
        "Embedded {} of {} products ({} skipped, {} failed) in {:.1}s",
        stats.succeeded, stats.total, stats.skipped, stats.failed, stats.elapsed_secs
    );
    if stats.processed > 0 {
        println!(
            "Average {:.2}s per product",
            stats.elapsed_secs / stats.processed as f64
        );
    }
    println!("Index rebuilt with {} vectors", stats.indexed);
    Ok(())
}

fn rebuild(settings: &Settings) -> Result<()> {
    let engine = build_engine(settings, false)?;
    let stats = engine.rebuild_index()?;
    println!(
        "Index rebuilt with {} vectors ({} records skipped)",
        stats.loaded, stats.skipped
    );
    Ok(())
}

async fn similar(settings: &Settings, args: SimilarArgs) -> Result<()> {
    // Recomputing the query embedding needs the model; plain queries don't
    let engine = build_engine(settings, args.rebuild)?;
    let options = QueryOptions {
        limit: args.limit,
        min_similarity: args.min_similarity,
        same_category_only: !args.any_category,
        rebuild: args.rebuild,
    };
    let result = engine.similar_products(&args.product_id, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.recommendations.is_empty() {
        println!(
            "No similar products found for {} ({} indexed)",
            result.product_id, result.indexed_total
        );
        return Ok(());
    }

    println!("Products similar to {}:", result.product_id);
    for (rank, rec) in result.recommendations.iter().enumerate() {
        let category = rec
            .category
            .as_deref()
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();
        println!(
            "  {}. {} ({:.1}% similar, {}){}",
            rank + 1,
            rec.product_id,
            rec.similarity * 100.0,
            rec.style_match,
            category
        );
    }
    Ok(())
}

async fn embed(settings: &Settings, args: EmbedArgs) -> Result<()> {
    let engine = build_engine(settings, true)?;
    let product = ProductSource {
        product_id: args.product_id,
        image_url: args.image_url,
        category: args.category,
    };
    let record = engine.embed_product(&product, false).await?;
    println!(
        "Embedded {} ({} dimensions, model {})",
        record.product_id,
        record.dimension(),
        record.model_version
    );
    Ok(())
}

async fn remove(settings: &Settings, product_id: &str) -> Result<()> {
    let engine = build_engine(settings, false)?;
    if engine.remove_product(product_id).await? {
        println!("Removed {}", product_id);
    } else {
        println!("Nothing stored for {}", product_id);
    }
    Ok(())
}

fn stats(settings: &Settings, json: bool) -> Result<()> {
    let engine = build_engine(settings, false)?;
    let stats = engine.stats()?;
    let capabilities = engine.capabilities();

    if json {
        let output = serde_json::json!({
            "stats": stats,
            "capabilities": capabilities,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Status:          {}", stats.status);
    println!("Model version:   {}", stats.model_version);
    println!("Index backend:   {}", stats.index.kind);
    println!("Indexed vectors: {}", stats.index.vector_count);
    println!("Stored records:  {}", stats.stored_records);
    println!("Coverage:        {:.0}%", stats.coverage * 100.0);
    println!(
        "Index file:      {}",
        if stats.index_file_exists {
            "present"
        } else {
            "missing"
        }
    );
    println!(
        "Mapping file:    {}",
        if stats.mapping_file_exists {
            "present"
        } else {
            "missing"
        }
    );
    if !stats.model_versions.is_empty() {
        println!("Records by model version:");
        for (version, count) in &stats.model_versions {
            println!("  {}: {}", version, count);
        }
    }
    if !capabilities.missing.is_empty() {
        println!(
            "Missing capabilities: {}",
            capabilities.missing.join(", ")
        );
    }
    Ok(())
}

fn products(settings: &Settings, json: bool) -> Result<()> {
    let engine = build_engine(settings, false)?;
    let listed = engine.available_products()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if listed.is_empty() {
        println!("No products embedded yet");
        return Ok(());
    }
    println!("{} embedded products:", listed.len());
    for product in &listed {
        println!(
            "  {} [{}] (model {}, updated {})",
            product.product_id,
            product.category.as_deref().unwrap_or("uncategorized"),
            product.model_version,
            product.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

fn config_show(settings: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("", "", "lookalike")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./lookalike.toml"))
}

fn config_init(config_path: Option<&str>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let rendered = toml::to_string_pretty(&Settings::default())
        .context("Failed to render default configuration")?;
    fs::write(&path, rendered).context("Failed to write config file")?;

    println!("Wrote starter config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_init_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        config_init(path.to_str(), false).unwrap();
        assert!(path.exists());

        let settings = Settings::load(path.to_str()).unwrap();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        config_init(path.to_str(), false).unwrap();
        assert!(config_init(path.to_str(), false).is_err());
        assert!(config_init(path.to_str(), true).is_ok());
    }

    #[test]
    fn test_default_config_path_names_toml_file() {
        let path = default_config_path();
        assert!(path.to_string_lossy().ends_with(".toml"));
    }
}
