//! The lint task: fix scripts in place and fail on remaining errors

use super::{check_files, run_blocking, PipelineTask, Task, TaskError, TaskReport};
use crate::build::{BuildContext, Pipeline, PipelineResult, Sources};
use crate::transform::{format_report, LintEngine, LintTransform, Severity};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Lint every script, writing auto-fixes back to the source files.
///
/// The report of remaining findings goes to stderr. The task fails if any
/// error-severity finding remains; warnings alone pass.
pub struct LintTask {
    sources: Sources,
    pipelines: Arc<Vec<Pipeline>>,
}

impl LintTask {
    /// Create the task over the configured lint sources.
    pub fn new(ctx: &BuildContext, engine: Arc<dyn LintEngine>) -> Self {
        let pipeline = Pipeline::in_place("lint").pipe(LintTransform::new(engine));
        Self {
            sources: Sources::globs(ctx.src_dir(), &ctx.config().lint.sources),
            pipelines: Arc::new(vec![pipeline]),
        }
    }

    /// Count error-severity findings and format the report.
    fn findings(result: &PipelineResult) -> (usize, String) {
        let files: Vec<_> =
            result.files.iter().map(|f| (f.source.clone(), f.findings.clone())).collect();
        let errors = files
            .iter()
            .flat_map(|(_, findings)| findings)
            .filter(|f| f.severity == Severity::Error)
            .count();
        (errors, format_report(&files))
    }
}

#[async_trait]
impl Task for LintTask {
    fn name(&self) -> &str {
        "lint"
    }

    async fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        tracing::info!("Starting 'lint'...");

        let sources = self.sources.clone();
        let pipelines = Arc::clone(&self.pipelines);
        let result =
            run_blocking("lint", move || PipelineTask::execute("lint", &sources, &pipelines)).await?;

        let (errors, report) = Self::findings(&result);
        if !report.is_empty() {
            eprint!("{}", report);
        }
        check_files(&result)?;
        if errors > 0 {
            return Err(TaskError::Lint { errors, report });
        }

        let duration = start.elapsed();
        tracing::info!("Finished 'lint' after {:?}", duration);
        let mut task_report = TaskReport::new("lint");
        task_report.pipelines.push(result.with_duration(duration));
        task_report.duration = duration;
        Ok(task_report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetConfig;
    use crate::mode::Mode;
    use crate::transform::{LintFinding, LintOutcome, TransformError};
    use std::path::Path;
    use tempfile::TempDir;

    /// Fixes `var` to `let`; reports `debugger` as an error and `console` as a warning.
    struct FakeEngine;

    impl LintEngine for FakeEngine {
        fn lint(&self, _path: &Path, source: &str) -> Result<LintOutcome, TransformError> {
            let fixed = source.replace("var ", "let ");
            let mut findings = Vec::new();
            for (i, line) in fixed.lines().enumerate() {
                let severity = if line.contains("debugger") {
                    Severity::Error
                } else if line.contains("console") {
                    Severity::Warning
                } else {
                    continue;
                };
                findings.push(LintFinding {
                    line: i as u32 + 1,
                    column: 1,
                    severity,
                    message: "flagged".to_string(),
                    rule: Some("fake".to_string()),
                });
            }
            Ok(LintOutcome { fixed: (fixed != source).then_some(fixed), findings })
        }
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, LintTask) {
        let temp = TempDir::new().unwrap();
        for (name, body) in files {
            let path = temp.path().join("src/js").join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let ctx = BuildContext::new(AssetConfig::default(), temp.path().to_path_buf(), Mode::Development);
        let task = LintTask::new(&ctx, Arc::new(FakeEngine));
        (temp, task)
    }

    #[tokio::test]
    async fn test_lint_fixes_in_place() {
        let (temp, task) = setup(&[("app.js", "var a = 1;\nconsole.log(a);\n")]);

        let report = task.run().await.unwrap();
        assert_eq!(report.outputs().len(), 1);

        let fixed = std::fs::read_to_string(temp.path().join("src/js/app.js")).unwrap();
        assert_eq!(fixed, "let a = 1;\nconsole.log(a);\n");
    }

    #[tokio::test]
    async fn test_lint_fails_on_remaining_errors() {
        let (temp, task) = setup(&[("app.js", "var a;\ndebugger;\n"), ("ok.js", "let b;\n")]);

        match task.run().await.unwrap_err() {
            TaskError::Lint { errors, report } => {
                assert_eq!(errors, 1);
                assert!(report.contains("app.js"));
                assert!(report.contains("2:1"));
                assert!(!report.contains("ok.js"));
            }
            other => panic!("unexpected error: {}", other),
        }

        // Fixes are still written even though the task failed
        let fixed = std::fs::read_to_string(temp.path().join("src/js/app.js")).unwrap();
        assert!(fixed.starts_with("let a;"));
    }

    #[tokio::test]
    async fn test_lint_clean_files_untouched() {
        let (_temp, task) = setup(&[("ok.js", "let b;\n")]);
        let report = task.run().await.unwrap();
        assert!(report.outputs().is_empty());
        assert_eq!(report.pipelines[0].unchanged_count(), 1);
    }
}
