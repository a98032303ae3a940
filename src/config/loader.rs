//! Configuration loading and discovery for `assetpipe.toml`
//!
//! Provides functions to find, load, and merge configuration. When no
//! `assetpipe.toml` exists, the `"gulp-config"` object of a sibling
//! `package.json` is honoured for the icon sizes.

use super::schema::AssetConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "assetpipe.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse assetpipe.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// package.json parsing error
    #[error("Failed to parse package.json: {0}")]
    PackageJson(#[from] serde_json::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory
    pub out: Option<PathBuf>,
    /// Override source directory
    pub src: Option<PathBuf>,
    /// Override dev server port
    pub port: Option<u16>,
}

/// A loaded configuration together with the directory it applies to.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed and validated configuration
    pub config: AssetConfig,
    /// Project root (directory of the config file, or the start directory)
    pub root: PathBuf,
    /// File the configuration came from, if any
    pub source: Option<PathBuf>,
}

/// The subset of package.json this tool understands.
#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(rename = "gulp-config")]
    gulp_config: Option<GulpConfig>,
}

#[derive(Debug, Deserialize)]
struct GulpConfig {
    #[serde(default)]
    sizes: Option<Vec<[u32; 2]>>,
}

/// Find assetpipe.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load the configuration for a project.
///
/// Resolution order:
/// 1. `path`, if given (must exist)
/// 2. `assetpipe.toml` found walking up from `start`
/// 3. `package.json` in `start` with a `"gulp-config"` object
/// 4. defaults, rooted at `start`
pub fn load_project(path: Option<&Path>, start: &Path) -> Result<LoadedConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_from(start.to_path_buf()),
    };

    if let Some(config_path) = config_path {
        let config = load_config_file(&config_path)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| start.to_path_buf());
        return Ok(LoadedConfig { config, root, source: Some(config_path) });
    }

    let package_json = start.join("package.json");
    if package_json.exists() {
        let config = load_package_json(&package_json)?;
        return Ok(LoadedConfig { config, root: start.to_path_buf(), source: Some(package_json) });
    }

    Ok(LoadedConfig { config: AssetConfig::default(), root: start.to_path_buf(), source: None })
}

/// Load configuration from a specific assetpipe.toml.
pub fn load_config_file(path: &Path) -> Result<AssetConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: AssetConfig = toml::from_str(&contents)?;
    validated(config)
}

/// Build a configuration from a package.json `"gulp-config"` object.
///
/// Only `sizes` is read; every other setting keeps its default.
pub fn load_package_json(path: &Path) -> Result<AssetConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let package: PackageJson = serde_json::from_str(&contents)?;

    let mut config = AssetConfig::default();
    if let Some(sizes) = package.gulp_config.and_then(|c| c.sizes) {
        config.icons.sizes = sizes;
    }
    validated(config)
}

fn validated(config: AssetConfig) -> Result<AssetConfig, ConfigError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }
    Ok(config)
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut AssetConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }

    if let Some(ref src) = overrides.src {
        config.project.src = src.clone();
    }

    if let Some(port) = overrides.port {
        config.server.port = port;
    }
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
