//! Named, runnable units of work and their composition
//!
//! Every task implements [`Task`]. File-processing tasks are
//! [`PipelineTask`]s: a set of sources plus one or more pipelines run over
//! them. [`series`] and [`parallel`] build higher-order tasks, and the
//! [`TaskRegistry`] holds the named tasks the CLI can run.

pub mod assets;
pub mod compose;
pub mod lint;
pub mod registry;
pub mod serve;

pub use assets::{build_icons, minify_images, scripts, styles};
pub use compose::{parallel, series, Parallel, Series};
pub use lint::LintTask;
pub use registry::TaskRegistry;
pub use serve::ServeTask;

use crate::build::{BuildError, Pipeline, PipelineResult, Sources};
use crate::serve::ServeError;
use crate::watch::WatchError;
use async_trait::async_trait;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a task failed
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// Sources could not be resolved or the destination could not be created
    #[error("'{task}': {source}")]
    Build {
        task: String,
        #[source]
        source: BuildError,
    },

    /// Some files failed; the others were written
    #[error("'{task}': {failed} of {total} file(s) failed\n{details}")]
    Files { task: String, failed: usize, total: usize, details: String },

    /// Error-severity lint findings remain after auto-fix
    #[error("'lint': {errors} error(s) remain after auto-fix")]
    Lint { errors: usize, report: String },

    /// The blocking worker panicked or was cancelled
    #[error("'{task}' did not complete: {message}")]
    Join { task: String, message: String },

    /// Several members of a parallel group failed
    #[error("{} tasks failed:\n{}", .0.len(), join_errors(.0))]
    Parallel(Vec<TaskError>),

    #[error(transparent)]
    Serve(#[from] ServeError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

fn join_errors(errors: &[TaskError]) -> String {
    errors.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n")
}

/// What a successful task did.
#[derive(Debug, Default)]
pub struct TaskReport {
    /// Task name
    pub task: String,
    /// Pipeline runs, in completion order
    pub pipelines: Vec<PipelineResult>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl TaskReport {
    /// Create an empty report.
    pub fn new(task: impl Into<String>) -> Self {
        Self { task: task.into(), ..Self::default() }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: TaskReport) {
        self.pipelines.extend(other.pipelines);
    }

    /// Every file written.
    pub fn outputs(&self) -> Vec<&PathBuf> {
        self.pipelines.iter().flat_map(|p| p.all_outputs()).collect()
    }

    /// One line per pipeline run.
    pub fn summary(&self) -> String {
        if self.pipelines.is_empty() {
            return format!("'{}' finished in {:?}", self.task, self.duration);
        }
        self.pipelines.iter().map(|p| p.summary()).collect::<Vec<_>>().join("\n")
    }
}

/// A named unit of work.
#[async_trait]
pub trait Task: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Run to completion.
    async fn run(&self) -> Result<TaskReport, TaskError>;
}

/// Sources run through one or more pipelines.
///
/// Sources are resolved on every run, so a re-run from a watcher sees files
/// created since startup. With several pipelines (one per icon size), all of
/// them run concurrently over the same files and the task fails if any file
/// in any of them failed, after all have finished.
pub struct PipelineTask {
    name: String,
    sources: Sources,
    pipelines: Arc<Vec<Pipeline>>,
}

impl PipelineTask {
    /// Create a task running `pipelines` over `sources`.
    pub fn new(name: impl Into<String>, sources: Sources, pipelines: Vec<Pipeline>) -> Self {
        Self { name: name.into(), sources, pipelines: Arc::new(pipelines) }
    }

    /// Where this task reads from.
    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// The pipelines this task runs.
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    /// Resolve sources and run every pipeline, blocking the calling thread.
    pub fn execute(
        name: &str,
        sources: &Sources,
        pipelines: &[Pipeline],
    ) -> Result<PipelineResult, TaskError> {
        let build_err = |source: BuildError| TaskError::Build { task: name.to_string(), source };

        let files = sources.resolve().map_err(|e| build_err(e.into()))?;
        if files.is_empty() {
            tracing::warn!(task = name, "no source files matched");
        }

        let runs: Vec<Result<PipelineResult, BuildError>> =
            pipelines.par_iter().map(|p| p.run(&files)).collect();

        let mut combined = PipelineResult::new(name);
        let mut first_error = None;
        for run in runs {
            match run {
                Ok(result) => combined.merge(result),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(build_err(e));
        }
        Ok(combined)
    }
}

/// Turn a pipeline result with failed files into [`TaskError::Files`].
pub(crate) fn check_files(result: &PipelineResult) -> Result<(), TaskError> {
    let failures = result.failures();
    if failures.is_empty() {
        return Ok(());
    }
    let details = failures
        .iter()
        .map(|f| format!("  - {}: {}", f.source.display(), f.status))
        .collect::<Vec<_>>()
        .join("\n");
    Err(TaskError::Files {
        task: result.name.clone(),
        failed: failures.len(),
        total: result.files.len(),
        details,
    })
}

/// Run a blocking pipeline job on the tokio blocking pool.
pub(crate) async fn run_blocking<F>(name: &str, job: F) -> Result<PipelineResult, TaskError>
where
    F: FnOnce() -> Result<PipelineResult, TaskError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| TaskError::Join { task: name.to_string(), message: e.to_string() })?
}

#[async_trait]
impl Task for PipelineTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        tracing::info!("Starting '{}'...", self.name);

        let name = self.name.clone();
        let sources = self.sources.clone();
        let pipelines = Arc::clone(&self.pipelines);
        let result =
            run_blocking(&self.name, move || Self::execute(&name, &sources, &pipelines)).await?;

        check_files(&result)?;
        let duration = start.elapsed();
        tracing::info!("Finished '{}' after {:?}", self.name, duration);

        let mut report = TaskReport::new(&self.name);
        report.pipelines.push(result.with_duration(duration));
        report.duration = duration;
        Ok(report)
    }
}
