//! Script linting with auto-fix

use super::{Asset, Transform, TransformError};
use crate::config::ToolCommand;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Severity of a lint finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A problem left in a file after fixes were applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintFinding {
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
    /// Rule identifier, absent for parse errors
    pub rule: Option<String>,
}

/// What a linter reports for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintOutcome {
    /// Source with auto-fixes applied; `None` when nothing was fixable
    pub fixed: Option<String>,
    /// Findings remaining after fixes
    pub findings: Vec<LintFinding>,
}

/// A linter able to fix and check a single file.
pub trait LintEngine: Send + Sync {
    /// Lint `source`, which was read from `path`.
    fn lint(&self, path: &Path, source: &str) -> Result<LintOutcome, TransformError>;
}

/// Runs eslint with the file on stdin and parses its JSON formatter output.
#[derive(Debug, Clone)]
pub struct EslintEngine {
    command: ToolCommand,
    cwd: PathBuf,
}

impl EslintEngine {
    const STEP: &'static str = "eslint";

    /// Create an engine running `command` from `cwd`.
    pub fn new(command: ToolCommand, cwd: impl Into<PathBuf>) -> Self {
        Self { command, cwd: cwd.into() }
    }
}

impl LintEngine for EslintEngine {
    fn lint(&self, path: &Path, source: &str) -> Result<LintOutcome, TransformError> {
        let input = path.to_string_lossy();
        let args: Vec<String> =
            self.command.args.iter().map(|a| a.replace("{input}", &input)).collect();

        let mut child = Command::new(&self.command.program)
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransformError::Launch {
                step: Self::STEP.to_string(),
                program: self.command.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes()).map_err(|e| TransformError::io(Self::STEP, e))?;
        }
        let output = child.wait_with_output().map_err(|e| TransformError::io(Self::STEP, e))?;

        // 0: clean, 1: problems reported; anything else is a crash or bad config
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                return Err(TransformError::ToolFailed {
                    step: Self::STEP.to_string(),
                    program: self.command.program.clone(),
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }

        parse_eslint_json(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| TransformError::rejected(Self::STEP, format!("unreadable report: {}", e)))
    }
}

#[derive(Deserialize)]
struct EslintFileResult {
    #[serde(default)]
    messages: Vec<EslintMessage>,
    output: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintMessage {
    rule_id: Option<String>,
    severity: u8,
    message: String,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    column: u32,
}

/// Parse the output of eslint's `json` formatter for a single file.
pub fn parse_eslint_json(json: &str) -> Result<LintOutcome, serde_json::Error> {
    let results: Vec<EslintFileResult> = serde_json::from_str(json)?;
    let mut outcome = LintOutcome::default();
    for result in results {
        if result.output.is_some() {
            outcome.fixed = result.output;
        }
        outcome.findings.extend(result.messages.into_iter().map(|m| LintFinding {
            line: m.line,
            column: m.column,
            severity: if m.severity >= 2 { Severity::Error } else { Severity::Warning },
            message: m.message,
            rule: m.rule_id,
        }));
    }
    Ok(outcome)
}

/// Apply a linter's fixes to an asset and record what remains.
///
/// Findings never fail the transform; the lint task decides what to do with
/// them.
#[derive(Clone)]
pub struct LintTransform {
    engine: Arc<dyn LintEngine>,
}

impl LintTransform {
    /// Create a lint step backed by `engine`.
    pub fn new(engine: Arc<dyn LintEngine>) -> Self {
        Self { engine }
    }
}

impl Transform for LintTransform {
    fn name(&self) -> &str {
        "lint"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let outcome = self.engine.lint(&asset.source, asset.text(self.name())?)?;
        if let Some(fixed) = outcome.fixed {
            asset.contents = fixed.into_bytes();
        }
        asset.findings = outcome.findings;
        Ok(asset)
    }
}

/// Format findings per file in eslint's "stylish" layout.
///
/// Returns an empty string when there is nothing to report.
pub fn format_report(files: &[(PathBuf, Vec<LintFinding>)]) -> String {
    let mut out = String::new();
    let mut errors = 0;
    let mut warnings = 0;

    for (path, findings) in files.iter().filter(|(_, f)| !f.is_empty()) {
        out.push_str(&format!("{}\n", path.display()));
        for finding in findings {
            match finding.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
            }
            let position = format!("{}:{}", finding.line, finding.column);
            out.push_str(&format!(
                "  {:<8} {:<8} {}  {}\n",
                position,
                finding.severity,
                finding.message,
                finding.rule.as_deref().unwrap_or("")
            ));
        }
        out.push('\n');
    }

    let total = errors + warnings;
    if total > 0 {
        out.push_str(&format!(
            "{} problem{} ({} error{}, {} warning{})\n",
            total,
            plural(total),
            errors,
            plural(errors),
            warnings,
            plural(warnings)
        ));
    }
    out
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
