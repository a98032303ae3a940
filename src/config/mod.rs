//! Configuration module for the asset pipeline
//!
//! Provides types and parsing for `assetpipe.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{load_project, CliOverrides, ConfigError, LoadedConfig};
pub use schema::*;
