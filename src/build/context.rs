//! Build context containing configuration and mode for a task run.

use crate::config::{loader, AssetConfig};
use crate::mode::Mode;
use std::path::{Path, PathBuf};

/// Configuration, project root, and build mode shared by all tasks.
///
/// The mode is fixed for the life of the context; tasks built from it never
/// consult the environment themselves.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: AssetConfig,
    /// Project root directory (where assetpipe.toml is located)
    project_root: PathBuf,
    /// Development or production
    mode: Mode,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// # Arguments
    /// - `config` - The loaded configuration
    /// - `project_root` - The project root directory
    /// - `mode` - Build mode
    pub fn new(config: AssetConfig, project_root: PathBuf, mode: Mode) -> Self {
        Self { config, project_root, mode }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Build mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether this is a production build.
    pub fn is_production(&self) -> bool {
        self.mode.is_production()
    }

    /// Get the source directory (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Get the output directory (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// A path under the source directory.
    pub fn src_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.src_dir().join(rel)
    }

    /// A path under the output directory.
    pub fn out_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.out_dir().join(rel)
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        loader::resolve_path(&self.project_root, path)
    }
}
