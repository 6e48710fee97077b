//! Configuration loading for lookalike.
//!
//! Layered precedence: built-in defaults -> config file -> env vars -> CLI
//! flags (applied by the caller). The default config file lives at
//! `~/.config/lookalike/config.toml`; environment variables use the
//! `LOOKALIKE_` prefix with `__` separating nested sections
//! (e.g. `LOOKALIKE_CACHE__TTL_SECS`).

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::LookalikeError;

/// Which vector index backend to run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Exact brute-force L2 index (default)
    #[default]
    Flat,
    /// Approximate HNSW index via usearch (requires the `hnsw` build feature)
    Hnsw,
}

/// Embedding cache configuration.
///
/// The engine keeps recently used embeddings in memory so repeated
/// recommendation queries for the same product skip the store lookup
/// and any recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Time-to-live for cached embeddings, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of cached embeddings before the oldest is evicted.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    1024
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".to_string());
        }
        if self.max_entries == 0 {
            return Err("cache.max_entries must be > 0".to_string());
        }
        Ok(())
    }
}

/// Image download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts for transient failures (timeouts, 5xx).
    #[serde(default = "default_fetch_max_retries")]
    pub max_retries: u32,

    /// Largest accepted image payload in bytes.
    #[serde(default = "default_fetch_max_image_bytes")]
    pub max_image_bytes: usize,
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_fetch_max_retries() -> u32 {
    3
}

fn default_fetch_max_image_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_fetch_max_retries(),
            max_image_bytes: default_fetch_max_image_bytes(),
        }
    }
}

impl FetchSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("fetch.timeout_secs must be > 0".to_string());
        }
        if self.max_image_bytes == 0 {
            return Err("fetch.max_image_bytes must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB embedding store directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory holding the persisted index + id-mapping artifact
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    /// Vector index backend
    #[serde(default)]
    pub index_backend: IndexBackend,

    /// Model version tag recorded with every embedding
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Expected embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Embedding cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Image download configuration
    #[serde(default)]
    pub fetch: FetchSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "lookalike")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data/db"))
        .to_string_lossy()
        .to_string()
}

fn default_index_dir() -> String {
    ProjectDirs::from("", "", "lookalike")
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("./data/index"))
        .to_string_lossy()
        .to_string()
}

fn default_model_version() -> String {
    "resnet50".to_string()
}

fn default_embedding_dimension() -> usize {
    2048
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_dir: default_index_dir(),
            index_backend: IndexBackend::default(),
            model_version: default_model_version(),
            embedding_dimension: default_embedding_dimension(),
            log_level: default_log_level(),
            cache: CacheSettings::default(),
            fetch: FetchSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/lookalike/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (LOOKALIKE_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, LookalikeError> {
        let config_dir = ProjectDirs::from("", "", "lookalike")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            // 1. Built-in defaults
            .set_default("db_path", default_db_path())
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("index_dir", default_index_dir())
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("model_version", default_model_version())
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("embedding_dimension", default_embedding_dimension() as i64)
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("cache.ttl_secs", default_cache_ttl_secs() as i64)
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("cache.max_entries", default_cache_max_entries() as i64)
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("fetch.timeout_secs", default_fetch_timeout_secs() as i64)
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default("fetch.max_retries", default_fetch_max_retries() as i64)
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            .set_default(
                "fetch.max_image_bytes",
                default_fetch_max_image_bytes() as i64,
            )
            .map_err(|e| LookalikeError::Config(e.to_string()))?
            // 2. Default config file (~/.config/lookalike/config.toml)
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        // 3. CLI-specified config file (higher precedence than default)
        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // 4. Environment variables (highest precedence before CLI flags)
        // Format: LOOKALIKE_DB_PATH, LOOKALIKE_CACHE__TTL_SECS, etc.
        builder = builder.add_source(
            Environment::with_prefix("LOOKALIKE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| LookalikeError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| LookalikeError::Config(e.to_string()))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding_dimension == 0 {
            return Err("embedding_dimension must be > 0".to_string());
        }
        if self.model_version.is_empty() {
            return Err("model_version must not be empty".to_string());
        }
        self.cache.validate()?;
        self.fetch.validate()?;
        Ok(())
    }

    /// Expand ~ in db_path to the actual home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in index_dir to the actual home directory
    pub fn expanded_index_dir(&self) -> PathBuf {
        expand_home(&self.index_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
