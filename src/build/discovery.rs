//! Source file discovery for pipelines.
//!
//! Resolves glob patterns (with `{a,b}` alternation) against a base directory
//! into a [`FileSet`]. Every file keeps its path relative to the non-wildcard
//! part of the pattern it matched, so `js/**/*.js` writes `js/lib/a.js` to
//! `<dest>/lib/a.js`.

use glob::glob;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Error during source discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    InvalidPattern(String, glob::PatternError),
    /// A required single source file does not exist
    Missing(PathBuf),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::InvalidPattern(pattern, err) => {
                write!(f, "Invalid glob pattern '{}': {}", pattern, err)
            }
            DiscoveryError::Missing(path) => {
                write!(f, "Source file not found: {}", path.display())
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// A discovered source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFile {
    /// Full path
    pub path: PathBuf,
    /// Path relative to the pattern's base, used for the output location
    pub relative: PathBuf,
}

/// Where a pipeline reads its inputs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sources {
    /// Glob patterns resolved against `base`; no matches is not an error
    Globs { base: PathBuf, patterns: Vec<String> },
    /// One required file
    Single(PathBuf),
}

impl Sources {
    /// Glob patterns relative to `base`.
    pub fn globs(base: impl Into<PathBuf>, patterns: &[String]) -> Self {
        Sources::Globs { base: base.into(), patterns: patterns.to_vec() }
    }

    /// A single required file.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Sources::Single(path.into())
    }

    /// Resolve to the files currently on disk.
    pub fn resolve(&self) -> Result<FileSet, DiscoveryError> {
        match self {
            Sources::Globs { base, patterns } => FileSet::discover(base, patterns),
            Sources::Single(path) => FileSet::single(path),
        }
    }
}

/// Ordered, de-duplicated set of source files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<SourceFile>,
}

impl FileSet {
    /// Discover files matching any of `patterns` under `base_dir`.
    pub fn discover(base_dir: &Path, patterns: &[String]) -> Result<Self, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in patterns {
            for expanded in expand_braces(pattern) {
                for file in discover_files(base_dir, &expanded)? {
                    if seen.insert(file.path.clone()) {
                        files.push(file);
                    }
                }
            }
        }

        files.sort();
        Ok(Self { files })
    }

    /// A set holding one file, which must exist.
    pub fn single(path: &Path) -> Result<Self, DiscoveryError> {
        if !path.is_file() {
            return Err(DiscoveryError::Missing(path.to_path_buf()));
        }
        let relative = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf());
        Ok(Self { files: vec![SourceFile { path: path.to_path_buf(), relative }] })
    }

    /// The files, sorted by path.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Discover files matching a single (brace-free) glob pattern.
///
/// # Arguments
/// - `base_dir` - Base directory to resolve patterns from
/// - `pattern` - Glob pattern to match
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<SourceFile>, DiscoveryError> {
    let full_pattern = base_dir.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();
    let root = base_dir.join(glob_base(pattern));

    let paths =
        glob(&pattern_str).map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    let relative = path
                        .strip_prefix(&root)
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());
                    files.push(SourceFile { path, relative });
                }
            }
            Err(e) => {
                // Unreadable entries are skipped, the rest still build
                tracing::warn!("error reading path: {}", e);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// The leading directories of a pattern that contain no wildcards.
///
/// For `js/**/*.js` this is `js`; for `*.png` it is empty.
pub fn glob_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let components: Vec<Component> = path.components().collect();

    // The last component is the file part even without wildcards
    for component in components.iter().take(components.len().saturating_sub(1)) {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(component);
    }
    base
}

/// Expand `{a,b}` alternations, which the glob crate does not support.
///
/// Nested groups are expanded recursively; a `{` without a matching `}` is
/// left as is.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, c) in pattern[open..].char_indices() {
        let idx = open + i;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(idx),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| expand_braces(&format!("{}{}{}", prefix, &pattern[w[0] + 1..w[1]], suffix)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("*.png"), vec!["*.png"]);
        assert_eq!(
            expand_braces("images/*.{png,jpg,svg}"),
            vec!["images/*.png", "images/*.jpg", "images/*.svg"]
        );
        assert_eq!(expand_braces("{a,b}/{c,d}"), vec!["a/c", "a/d", "b/c", "b/d"]);
        assert_eq!(expand_braces("x{a,{b,c}}"), vec!["xa", "xb", "xc"]);
        assert_eq!(expand_braces("broken{a,b"), vec!["broken{a,b"]);
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("js/*.js"), PathBuf::from("js"));
        assert_eq!(glob_base("js/**/*.js"), PathBuf::from("js"));
        assert_eq!(glob_base("*.png"), PathBuf::new());
        assert_eq!(glob_base("sass/main.scss"), PathBuf::from("sass"));
    }

    #[test]
    fn test_discover_files_with_braces() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "images/a.png");
        touch(temp.path(), "images/b.jpg");
        touch(temp.path(), "images/c.txt");
        touch(temp.path(), "other/d.png");

        let set =
            FileSet::discover(temp.path(), &["images/*.{png,jpg}".to_string()]).unwrap();
        let rel: Vec<_> = set.files().iter().map(|f| f.relative.clone()).collect();
        assert_eq!(rel, vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]);
    }

    #[test]
    fn test_discover_keeps_subdirectories() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "js/app.js");
        touch(temp.path(), "js/lib/util.js");

        let set = FileSet::discover(temp.path(), &["js/**/*.js".to_string()]).unwrap();
        let rel: Vec<_> = set.files().iter().map(|f| f.relative.clone()).collect();
        assert_eq!(rel, vec![PathBuf::from("app.js"), PathBuf::from("lib/util.js")]);
    }

    #[test]
    fn test_discover_deduplicates() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "js/app.js");

        let patterns = vec!["js/*.js".to_string(), "js/app.js".to_string()];
        let set = FileSet::discover(temp.path(), &patterns).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_discover_no_matches_is_empty() {
        let temp = TempDir::new().unwrap();
        let set = Sources::globs(temp.path(), &["js/*.js".to_string()]).resolve().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let temp = TempDir::new().unwrap();
        let result = FileSet::discover(temp.path(), &["[".to_string()]);
        assert!(matches!(result, Err(DiscoveryError::InvalidPattern(_, _))));
    }

    #[test]
    fn test_single_requires_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("images/avatar.png");
        assert!(matches!(Sources::single(&missing).resolve(), Err(DiscoveryError::Missing(_))));

        touch(temp.path(), "images/avatar.png");
        let set = Sources::single(&missing).resolve().unwrap();
        assert_eq!(set.files()[0].relative, PathBuf::from("avatar.png"));
    }
}
