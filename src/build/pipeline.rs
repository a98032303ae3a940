//! Pipeline execution.
//!
//! A [`Pipeline`] reads each source file, threads it through its transforms in
//! order, and writes the result. Files are processed in parallel with rayon.
//! A failing file is recorded in the result and does not stop the others;
//! nothing is written for it.

use crate::build::{DiscoveryError, FileResult, FileSet, PipelineResult, SourceFile};
use crate::transform::{Asset, Transform};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Error that stops a whole pipeline run.
#[derive(Debug)]
pub enum BuildError {
    /// Discovery error
    Discovery(DiscoveryError),
    /// IO error preparing the destination
    Io(std::io::Error),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Discovery(e) => write!(f, "Discovery error: {}", e),
            BuildError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<DiscoveryError> for BuildError {
    fn from(e: DiscoveryError) -> Self {
        BuildError::Discovery(e)
    }
}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        BuildError::Io(e)
    }
}

/// Where a pipeline writes its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Under a directory, at each file's path relative to its pattern base
    Dir(PathBuf),
    /// Back over the source file, only when the contents changed
    InPlace,
}

/// An ordered list of transforms plus a destination.
pub struct Pipeline {
    name: String,
    transforms: Vec<Box<dyn Transform>>,
    destination: Destination,
}

impl Pipeline {
    /// Create an empty pipeline writing under `dest`.
    pub fn new(name: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), transforms: Vec::new(), destination: Destination::Dir(dest.into()) }
    }

    /// Create an empty pipeline that writes results back over their sources.
    pub fn in_place(name: impl Into<String>) -> Self {
        Self { name: name.into(), transforms: Vec::new(), destination: Destination::InPlace }
    }

    /// Append a step.
    pub fn pipe(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the steps, in order.
    pub fn steps(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Destination of this pipeline.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Run over every file in `files`.
    ///
    /// Only a destination that cannot be created fails the whole run;
    /// per-file failures are reported in the result.
    pub fn run(&self, files: &FileSet) -> Result<PipelineResult, BuildError> {
        let start = Instant::now();

        if let Destination::Dir(dest) = &self.destination {
            fs::create_dir_all(dest)?;
        }

        let results: Vec<FileResult> =
            files.files().par_iter().map(|file| self.process_file(file)).collect();

        let mut result = PipelineResult::new(&self.name);
        for file in results {
            if let crate::build::BuildStatus::Failed(err) = &file.status {
                tracing::error!(pipeline = %self.name, file = %file.source.display(), "{}", err);
            }
            result.add_result(file);
        }
        Ok(result.with_duration(start.elapsed()))
    }

    /// Run the transforms over one file and write its outputs.
    fn process_file(&self, file: &SourceFile) -> FileResult {
        let start = Instant::now();
        let source = file.path.clone();

        let asset = match Asset::read(&file.path) {
            Ok(mut asset) => {
                asset.path = file.relative.clone();
                asset
            }
            Err(e) => {
                return FileResult::failed(source, format!("read: {}", e), start.elapsed());
            }
        };
        let original = match self.destination {
            Destination::InPlace => Some(asset.contents.clone()),
            Destination::Dir(_) => None,
        };

        let asset = match self.transforms.iter().try_fold(asset, |asset, t| t.apply(asset)) {
            Ok(asset) => asset,
            Err(e) => return FileResult::failed(source, e.to_string(), start.elapsed()),
        };
        let findings = asset.findings.clone();

        let written = match &self.destination {
            Destination::Dir(dest) => write_outputs(dest, &asset),
            Destination::InPlace => {
                if original.as_deref() == Some(asset.contents.as_slice()) {
                    return FileResult::unchanged(source, start.elapsed()).with_findings(findings);
                }
                write_atomic(&asset.source, &asset.contents).map(|()| vec![asset.source.clone()])
            }
        };

        match written {
            Ok(outputs) => {
                tracing::debug!(pipeline = %self.name, file = %source.display(), "written");
                FileResult::success(source, outputs, start.elapsed()).with_findings(findings)
            }
            Err(e) => FileResult::failed(source, format!("write: {}", e), start.elapsed()),
        }
    }
}

/// Write an asset and its sidecars under `dest`.
fn write_outputs(dest: &Path, asset: &Asset) -> std::io::Result<Vec<PathBuf>> {
    let mut outputs = Vec::with_capacity(1 + asset.sidecars.len());

    let main = dest.join(&asset.path);
    write_atomic(&main, &asset.contents)?;
    outputs.push(main);

    for sidecar in &asset.sidecars {
        let path = dest.join(&sidecar.path);
        write_atomic(&path, &sidecar.contents)?;
        outputs.push(path);
    }
    Ok(outputs)
}

/// Write `contents` to `path` through a temporary file in the same directory,
/// so readers never observe a partial file.
///
/// A replaced file keeps its permissions.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut builder = tempfile::Builder::new();
    // New files get the usual umask-derived mode rather than 0600
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(parent)?;
    tmp.write_all(contents)?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
