//! # lookalike-cli
//!
//! Command-line interface for the Lookalike visual recommendation engine:
//! bulk embedding runs, index rebuilds, similarity queries, and store
//! inspection.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, ConfigCommands, EmbedArgs, GenerateArgs, SimilarArgs};
pub use commands::execute;
