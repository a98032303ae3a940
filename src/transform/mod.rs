//! Transforms applied to assets flowing through a pipeline
//!
//! A [`Transform`] maps one [`Asset`] to a new one. Each implementation
//! stands for a single tool invocation: an image re-encode, a SASS compile,
//! a minifier run, and so on. The set of transforms is closed; pipelines are
//! assembled from the concrete types in the submodules.

pub mod conditional;
pub mod css;
pub mod images;
pub mod lint;
pub mod rename;
pub mod sourcemap;
pub mod tool;

pub use conditional::When;
pub use css::{MinifyCss, PrefixCss};
pub use images::{CompressImage, ResizeImage};
pub use lint::{
    format_report, EslintEngine, LintEngine, LintFinding, LintOutcome, LintTransform, Severity,
};
pub use rename::Rename;
pub use sourcemap::{InitSourceMap, WriteSourceMap};
pub use tool::ExternalTool;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error raised by a single transform on a single file
#[derive(Debug, Error)]
pub enum TransformError {
    /// Reading or writing a scratch file failed
    #[error("{step}: I/O error: {source}")]
    Io {
        step: String,
        #[source]
        source: std::io::Error,
    },
    /// The external program could not be started
    #[error("{step}: failed to launch '{program}': {source}")]
    Launch {
        step: String,
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The external program exited unsuccessfully
    #[error("{step}: '{program}' exited with {status}: {stderr}")]
    ToolFailed { step: String, program: String, status: String, stderr: String },
    /// The input could not be processed
    #[error("{step}: {message}")]
    Rejected { step: String, message: String },
}

impl TransformError {
    /// Shorthand for [`TransformError::Rejected`].
    pub fn rejected(step: &str, message: impl Into<String>) -> Self {
        TransformError::Rejected { step: step.to_string(), message: message.into() }
    }

    /// Shorthand for [`TransformError::Io`].
    pub fn io(step: &str, source: std::io::Error) -> Self {
        TransformError::Io { step: step.to_string(), source }
    }
}

/// An extra file written next to its asset (e.g. `main.css.map`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    /// Path relative to the destination directory
    pub path: PathBuf,
    /// File contents
    pub contents: Vec<u8>,
}

/// A file in flight through a pipeline.
#[derive(Debug, Clone, Default)]
pub struct Asset {
    /// Where the file was read from
    pub source: PathBuf,
    /// Output path, relative to the destination directory
    pub path: PathBuf,
    /// Current contents
    pub contents: Vec<u8>,
    /// Set by [`InitSourceMap`]; tools emit a map only when this is set
    pub source_map_requested: bool,
    /// Source map (JSON) produced by the most recent map-aware tool
    pub source_map: Option<String>,
    /// Extra files to write alongside this one
    pub sidecars: Vec<Sidecar>,
    /// Findings recorded by [`LintTransform`]
    pub findings: Vec<LintFinding>,
}

impl Asset {
    /// Create an asset from in-memory contents.
    pub fn new(source: impl Into<PathBuf>, path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self { source: source.into(), path: path.into(), contents, ..Default::default() }
    }

    /// Read an asset from disk; its output path is its file name.
    pub fn read(source: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read(source)?;
        let name = source.file_name().map(PathBuf::from).unwrap_or_else(|| source.to_path_buf());
        Ok(Self::new(source, name, contents))
    }

    /// File extension of the output path, lowercased.
    pub fn extension(&self) -> Option<String> {
        self.path.extension().map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Output file name as a string.
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Contents as UTF-8 text.
    pub fn text(&self, step: &str) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| TransformError::rejected(step, format!("not valid UTF-8: {}", e)))
    }
}

/// One step of a pipeline.
pub trait Transform: Send + Sync {
    /// Short step name used in logs and errors
    fn name(&self) -> &str;

    /// Transform an asset.
    fn apply(&self, asset: Asset) -> Result<Asset, TransformError>;
}
