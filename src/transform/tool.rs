//! Transforms that shell out to an external program (sass, babel, terser)

use super::{Asset, Transform, TransformError};
use crate::config::ToolCommand;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Maximum number of stderr lines kept in a [`TransformError::ToolFailed`]
const STDERR_TAIL_LINES: usize = 20;

/// Run an external program over an asset.
///
/// The asset is written to a scratch directory, the command runs with
/// `{input}` and `{output}` pointing into it, and the output file replaces the
/// asset contents. When the asset has a source map requested, the command's
/// `source_map_args` are appended and `{output}.map` is picked up if the
/// program wrote one.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    step: String,
    command: ToolCommand,
    cwd: PathBuf,
    output_extension: Option<String>,
}

impl ExternalTool {
    /// Create a step named `step` running `command` from `cwd`.
    pub fn new(step: impl Into<String>, command: ToolCommand, cwd: impl Into<PathBuf>) -> Self {
        Self { step: step.into(), command, cwd: cwd.into(), output_extension: None }
    }

    /// Change the asset's extension (e.g. `scss` to `css`).
    pub fn with_output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = Some(ext.into());
        self
    }

    /// Build the argument list for one invocation.
    fn args(&self, input: &Path, output: &Path, source_dir: &Path, with_map: bool) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let source_dir = source_dir.to_string_lossy();

        let mut args = self.command.args.clone();
        if with_map {
            args.extend(self.command.source_map_args.iter().cloned());
        }
        args.into_iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{source_dir}", &source_dir)
            })
            .collect()
    }

    fn output_name(&self, asset: &Asset) -> PathBuf {
        match &self.output_extension {
            Some(ext) => asset.path.with_extension(ext),
            None => asset.path.clone(),
        }
    }
}

impl Transform for ExternalTool {
    fn name(&self) -> &str {
        &self.step
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let io = |e| TransformError::io(&self.step, e);

        let scratch = tempfile::TempDir::new().map_err(io)?;
        let input = scratch.path().join(asset.file_name());
        let out_name = self.output_name(&asset);
        let out_dir = scratch.path().join("out");
        std::fs::create_dir(&out_dir).map_err(io)?;
        let output = out_dir.join(out_name.file_name().unwrap_or(out_name.as_os_str()));
        std::fs::write(&input, &asset.contents).map_err(io)?;

        let source_dir = match asset.source.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => self.cwd.clone(),
        };
        let with_map = asset.source_map_requested && !self.command.source_map_args.is_empty();
        let args = self.args(&input, &output, &source_dir, with_map);

        tracing::debug!(step = %self.step, program = %self.command.program, ?args, "running tool");
        let result = Command::new(&self.command.program)
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| TransformError::Launch {
                step: self.step.clone(),
                program: self.command.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(TransformError::ToolFailed {
                step: self.step.clone(),
                program: self.command.program.clone(),
                status: result.status.to_string(),
                stderr: stderr_tail(&result.stderr),
            });
        }

        let contents = std::fs::read(&output).map_err(|e| {
            TransformError::rejected(
                &self.step,
                format!("'{}' produced no output file: {}", self.command.program, e),
            )
        })?;

        if with_map {
            let map_path = PathBuf::from(format!("{}.map", output.display()));
            asset.source_map = std::fs::read_to_string(&map_path).ok();
        }

        asset.contents = strip_source_map_comment(contents);
        asset.path = out_name;
        Ok(asset)
    }
}

/// Last lines of a tool's stderr, trimmed.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Remove a trailing `sourceMappingURL` comment; the comment is rewritten
/// when the map is emitted.
fn strip_source_map_comment(contents: Vec<u8>) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(&contents) else {
        return contents;
    };
    let body = text.trim_end();
    let (head, last) = match body.rfind('\n') {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => ("", body),
    };
    let last = last.trim();
    if last.starts_with("/*# sourceMappingURL=") || last.starts_with("//# sourceMappingURL=") {
        let mut out = head.trim_end().to_string();
        out.push('\n');
        out.into_bytes()
    } else {
        contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_source_map_comment() {
        let css = b"a{color:red}\n/*# sourceMappingURL=main.css.map */\n".to_vec();
        assert_eq!(strip_source_map_comment(css), b"a{color:red}\n");

        let js = b"let a=1;\n//# sourceMappingURL=app.js.map".to_vec();
        assert_eq!(strip_source_map_comment(js), b"let a=1;\n");

        let plain = b"let a=1;\n".to_vec();
        assert_eq!(strip_source_map_comment(plain.clone()), plain);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[test]
    fn test_args_substitution() {
        let cmd = ToolCommand::new("sass", &["--load-path={source_dir}", "{input}", "{output}"])
            .with_source_map_args(&["--source-map"]);
        let tool = ExternalTool::new("sass", cmd, "/project");

        let args = tool.args(
            Path::new("/tmp/in.scss"),
            Path::new("/tmp/out.css"),
            Path::new("/project/src/sass"),
            true,
        );
        assert_eq!(
            args,
            vec!["--load-path=/project/src/sass", "/tmp/in.scss", "/tmp/out.css", "--source-map"]
        );

        let args = tool.args(Path::new("a"), Path::new("b"), Path::new("c"), false);
        assert_eq!(args.len(), 3);
    }

    #[cfg(unix)]
    fn copy_tool(script: &str) -> ToolCommand {
        ToolCommand::new("sh", &["-c", script, "sh", "{input}", "{output}"])
    }

    #[cfg(unix)]
    #[test]
    fn test_external_tool_renames_and_reads_output() {
        let temp = tempfile::TempDir::new().unwrap();
        let tool = ExternalTool::new("upper", copy_tool("tr a-z A-Z < \"$1\" > \"$2\""), temp.path())
            .with_output_extension("css");

        let asset = Asset::new("src/main.scss", "main.scss", b"a{b:c}".to_vec());
        let out = tool.apply(asset).unwrap();
        assert_eq!(out.contents, b"A{B:C}");
        assert_eq!(out.path, PathBuf::from("main.css"));
        assert!(out.source_map.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_tool_picks_up_source_map() {
        let temp = tempfile::TempDir::new().unwrap();
        let cmd = copy_tool(
            "cp \"$1\" \"$2\" && if [ \"$3\" = map ]; then printf '{\"version\":3}' > \"$2.map\"; fi",
        )
        .with_source_map_args(&["map"]);
        let tool = ExternalTool::new("copy", cmd, temp.path());

        let mut asset = Asset::new("app.js", "app.js", b"let a;\n".to_vec());
        asset.source_map_requested = true;
        let out = tool.apply(asset.clone()).unwrap();
        assert_eq!(out.source_map.as_deref(), Some("{\"version\":3}"));

        asset.source_map_requested = false;
        let out = tool.apply(asset).unwrap();
        assert!(out.source_map.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_tool_failure_carries_stderr() {
        let temp = tempfile::TempDir::new().unwrap();
        let tool = ExternalTool::new("sass", copy_tool("echo 'bad syntax' >&2; exit 65"), temp.path());

        let err = tool.apply(Asset::new("a.scss", "a.scss", b"a{".to_vec())).unwrap_err();
        match err {
            TransformError::ToolFailed { step, stderr, .. } => {
                assert_eq!(step, "sass");
                assert_eq!(stderr, "bad syntax");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_external_tool_missing_program() {
        let temp = tempfile::TempDir::new().unwrap();
        let cmd = ToolCommand::new("assetpipe-no-such-program", &["{input}"]);
        let err = ExternalTool::new("babel", cmd, temp.path())
            .apply(Asset::new("a.js", "a.js", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, TransformError::Launch { .. }));
    }
}
