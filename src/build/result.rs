//! Pipeline result types.
//!
//! Contains types for representing the outcome of running a pipeline over a
//! set of files.

use crate::transform::LintFinding;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Outputs were written
    Success,
    /// Nothing needed writing (unchanged in-place output)
    Unchanged,
    /// A step failed; nothing was written for this file
    Failed(String),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Unchanged)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Unchanged => write!(f, "unchanged"),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of processing a single file.
#[derive(Debug, Clone)]
pub struct FileResult {
    /// Source file
    pub source: PathBuf,
    /// Status
    pub status: BuildStatus,
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Processing time
    pub duration: Duration,
    /// Lint findings left in the file
    pub findings: Vec<LintFinding>,
}

impl FileResult {
    /// Create a successful result.
    pub fn success(source: PathBuf, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { source, status: BuildStatus::Success, outputs, duration, findings: vec![] }
    }

    /// Create a result for a file whose output already matched.
    pub fn unchanged(source: PathBuf, duration: Duration) -> Self {
        Self { source, status: BuildStatus::Unchanged, outputs: vec![], duration, findings: vec![] }
    }

    /// Create a failed result.
    pub fn failed(source: PathBuf, error: String, duration: Duration) -> Self {
        Self {
            source,
            status: BuildStatus::Failed(error),
            outputs: vec![],
            duration,
            findings: vec![],
        }
    }

    /// Attach lint findings.
    pub fn with_findings(mut self, findings: Vec<LintFinding>) -> Self {
        self.findings = findings;
        self
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineResult {
    /// Pipeline name
    pub name: String,
    /// Results for each file, in source order
    pub files: Vec<FileResult>,
    /// Total duration
    pub total_duration: Duration,
}

impl PipelineResult {
    /// Create a new empty result.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Add a file result.
    pub fn add_result(&mut self, result: FileResult) {
        self.files.push(result);
    }

    /// Append all file results of another run.
    pub fn merge(&mut self, other: PipelineResult) {
        self.files.extend(other.files);
        self.total_duration = self.total_duration.max(other.total_duration);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Get the number of files written.
    pub fn success_count(&self) -> usize {
        self.files.iter().filter(|r| matches!(r.status, BuildStatus::Success)).count()
    }

    /// Get the number of unchanged files.
    pub fn unchanged_count(&self) -> usize {
        self.files.iter().filter(|r| matches!(r.status, BuildStatus::Unchanged)).count()
    }

    /// Get the number of failed files.
    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the run succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.files.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Get failed file results.
    pub fn failures(&self) -> Vec<&FileResult> {
        self.files.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the run.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let unchanged = self.unchanged_count();
        let failed = self.failed_count();
        let total = self.files.len();

        if failed > 0 {
            lines.push(format!(
                "'{}' failed: {} written, {} unchanged, {} failed ({} total)",
                self.name, success, unchanged, failed, total
            ));
            for file in self.failures() {
                lines.push(format!("  - {}: {}", file.source.display(), file.status));
            }
        } else {
            lines.push(format!(
                "'{}' finished: {} written, {} unchanged ({} total) in {:?}",
                self.name, success, unchanged, total, self.total_duration
            ));
        }

        lines.join("\n")
    }
}
