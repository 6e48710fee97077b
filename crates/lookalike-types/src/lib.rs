//! # lookalike-types
//!
//! Shared domain types for the lookalike recommendation engine.
//!
//! This crate defines the pieces every other crate agrees on:
//! - Settings: layered configuration (defaults -> file -> env -> CLI)
//! - ProductSource: catalog manifest entries fed to batch generation
//! - LookalikeError: the shared error type for config and manifest handling

pub mod config;
pub mod error;
pub mod product;

pub use config::{CacheSettings, FetchSettings, IndexBackend, Settings};
pub use error::LookalikeError;
pub use product::ProductSource;
