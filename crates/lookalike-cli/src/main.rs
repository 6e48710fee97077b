//! Lookalike
//!
//! Visual product recommendations: embed catalog images with a ResNet-50
//! feature extractor and find products that look alike.
//!
//! # Usage
//!
//! ```bash
//! lookalike generate products.json [--batch-size N] [--rebuild]
//! lookalike similar PRODUCT_ID [--limit N] [--min-similarity S] [--json]
//! lookalike embed PRODUCT_ID IMAGE_URL [--category CAT]
//! lookalike stats [--json]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/lookalike/config.toml)
//! 3. Environment variables (LOOKALIKE_*)
//! 4. CLI flags

use anyhow::Result;

use lookalike_cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    execute(cli).await
}
