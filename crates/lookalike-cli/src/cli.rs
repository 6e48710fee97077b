//! CLI argument parsing for the lookalike tool.
//!
//! Global flags (`--config`, `--log-level`) apply to every command and
//! override the config file and environment.

use clap::{Args, Parser, Subcommand};
use lookalike_engine::{DEFAULT_BATCH_SIZE, DEFAULT_LIMIT, DEFAULT_MIN_SIMILARITY};
use std::path::PathBuf;

/// Lookalike
///
/// Visual product recommendations: embed catalog images and find products
/// that look alike.
#[derive(Parser, Debug)]
#[command(name = "lookalike")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/lookalike/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Lookalike commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed catalog products from a manifest and rebuild the index
    Generate(GenerateArgs),

    /// Rebuild the vector index from stored embeddings
    Rebuild,

    /// Find products that look like the given product
    Similar(SimilarArgs),

    /// Embed a single product image and index it
    Embed(EmbedArgs),

    /// Remove a product's embedding from store and index
    Remove {
        /// Product to remove
        product_id: String,
    },

    /// Show store and index health
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List embedded products
    Products {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Arguments for the generate command
#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Product manifest: JSON array of {product_id, image_url, category}
    pub manifest: PathBuf,

    /// Products embedded per concurrent batch
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Re-embed products that already have an embedding
    #[arg(long)]
    pub rebuild: bool,

    /// Only process products in this category
    #[arg(long)]
    pub category: Option<String>,

    /// Stop after this many products
    #[arg(long)]
    pub limit: Option<usize>,

    /// Tag embeddings with this model version instead of the configured one
    #[arg(long)]
    pub model_version: Option<String>,
}

/// Arguments for the similar command
#[derive(Args, Debug, Clone)]
pub struct SimilarArgs {
    /// Source product id
    pub product_id: String,

    /// Maximum recommendations to return
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Minimum similarity score (0.0 - 1.0)
    #[arg(long, default_value_t = DEFAULT_MIN_SIMILARITY)]
    pub min_similarity: f32,

    /// Include products from any category, not just the source's
    #[arg(long)]
    pub any_category: bool,

    /// Recompute the query embedding from the source image
    #[arg(long)]
    pub rebuild: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the embed command
#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    /// Product id
    pub product_id: String,

    /// Source image URL
    pub image_url: String,

    /// Product category
    #[arg(long)]
    pub category: Option<String>,
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,

    /// Write a starter config file with the current defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
