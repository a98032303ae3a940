//! Configuration schema types for `assetpipe.toml`
//!
//! Defines the structure and validation rules for an asset pipeline project.
//! Every section is optional; a missing file or section means defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// PNG re-encoding effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    /// Fastest encode, larger files
    Fast,
    /// Encoder default
    Default,
    /// Smallest output
    #[default]
    Best,
}

/// Project layout section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Source root (relative to the project root)
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output root (relative to the project root)
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { src: default_src(), out: default_out() }
    }
}

/// `minify-images` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Glob patterns, relative to `project.src`
    #[serde(default = "default_image_sources")]
    pub sources: Vec<String>,
    /// Output directory, relative to `project.out`
    #[serde(default = "default_images_out")]
    pub out: PathBuf,
    /// JPEG re-encode quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// PNG re-encode effort
    #[serde(default)]
    pub png_compression: PngCompression,
    /// Lossy PNG palette quality as `[min, max]` (0-100); a palette that
    /// cannot reach `min` leaves the image lossless
    #[serde(default = "default_png_quality")]
    pub png_quality: [u8; 2],
}

fn default_image_sources() -> Vec<String> {
    vec!["images/*.{png,jpg,jpeg,gif,svg}".to_string()]
}

fn default_images_out() -> PathBuf {
    PathBuf::from("images")
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_png_quality() -> [u8; 2] {
    [65, 80]
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            sources: default_image_sources(),
            out: default_images_out(),
            jpeg_quality: default_jpeg_quality(),
            png_compression: PngCompression::default(),
            png_quality: default_png_quality(),
        }
    }
}

/// `build-icons` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconsConfig {
    /// Source image, relative to `project.src`
    #[serde(default = "default_icon_source")]
    pub source: PathBuf,
    /// Output directory, relative to `project.out`
    #[serde(default = "default_icons_out")]
    pub out: PathBuf,
    /// Icon sizes as `[width, height]` pairs
    #[serde(default = "default_icon_sizes")]
    pub sizes: Vec<[u32; 2]>,
    /// Allow enlarging a source smaller than the target
    #[serde(default)]
    pub upscale: bool,
}

fn default_icon_source() -> PathBuf {
    PathBuf::from("images/avatar.png")
}

fn default_icons_out() -> PathBuf {
    PathBuf::from("images/favicon")
}

fn default_icon_sizes() -> Vec<[u32; 2]> {
    vec![[16, 16], [32, 32]]
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            source: default_icon_source(),
            out: default_icons_out(),
            sizes: default_icon_sizes(),
            upscale: false,
        }
    }
}

/// Browser versions used for vendor prefixing, as `"major"` or `"major.minor"`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firefox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safari: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_saf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samsung: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ie: Option<String>,
}

impl Default for BrowserTargets {
    fn default() -> Self {
        Self {
            chrome: Some("80".to_string()),
            edge: Some("88".to_string()),
            firefox: Some("78".to_string()),
            safari: Some("13".to_string()),
            ios_saf: Some("13".to_string()),
            android: None,
            samsung: None,
            opera: None,
            ie: None,
        }
    }
}

impl BrowserTargets {
    /// All configured `(browser, version)` pairs.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("chrome", &self.chrome),
            ("edge", &self.edge),
            ("firefox", &self.firefox),
            ("safari", &self.safari),
            ("ios_saf", &self.ios_saf),
            ("android", &self.android),
            ("samsung", &self.samsung),
            ("opera", &self.opera),
            ("ie", &self.ie),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.as_deref().map(|v| (name, v)))
        .collect()
    }
}

/// Parse `"major"` or `"major.minor"` into a packed `(major << 16) | (minor << 8)`
/// browser version.
pub fn parse_browser_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().splitn(2, '.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if major > 0xffff || minor > 0xff {
        return None;
    }
    Some((major << 16) | (minor << 8))
}

/// `styles` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Entry stylesheet, relative to `project.src`
    #[serde(default = "default_styles_entry")]
    pub entry: PathBuf,
    /// Output directory, relative to `project.out`
    #[serde(default = "default_styles_out")]
    pub out: PathBuf,
    /// Prefixing targets
    #[serde(default)]
    pub targets: BrowserTargets,
}

fn default_styles_entry() -> PathBuf {
    PathBuf::from("sass/main.scss")
}

fn default_styles_out() -> PathBuf {
    PathBuf::from("css")
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_styles_entry(),
            out: default_styles_out(),
            targets: BrowserTargets::default(),
        }
    }
}

/// `scripts` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Glob patterns, relative to `project.src`
    #[serde(default = "default_script_sources")]
    pub sources: Vec<String>,
    /// Output directory, relative to `project.out`
    #[serde(default = "default_scripts_out")]
    pub out: PathBuf,
}

fn default_script_sources() -> Vec<String> {
    vec!["js/*.js".to_string()]
}

fn default_scripts_out() -> PathBuf {
    PathBuf::from("js")
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { sources: default_script_sources(), out: default_scripts_out() }
    }
}

/// `lint` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    /// Glob patterns, relative to `project.src`; fixes are written back in place
    #[serde(default = "default_script_sources")]
    pub sources: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self { sources: default_script_sources() }
    }
}

/// Command line of an external tool.
///
/// `{input}`, `{output}` and `{source_dir}` (the directory the asset was read
/// from) in `args` are replaced with paths.
/// `source_map_args` are appended only when a source map is wanted; the tool
/// is then expected to write `{output}.map`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra arguments when a source map is requested
    #[serde(default)]
    pub source_map_args: Vec<String>,
}

impl ToolCommand {
    /// Create a tool command.
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            source_map_args: vec![],
        }
    }

    /// Set the arguments appended when a source map is requested.
    pub fn with_source_map_args(mut self, args: &[&str]) -> Self {
        self.source_map_args = args.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// External tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// SASS compiler
    #[serde(default = "default_sass")]
    pub sass: ToolCommand,
    /// Script transpiler
    #[serde(default = "default_babel")]
    pub babel: ToolCommand,
    /// Script minifier
    #[serde(default = "default_terser")]
    pub terser: ToolCommand,
    /// Linter; reads the file on stdin and prints JSON results
    #[serde(default = "default_eslint")]
    pub eslint: ToolCommand,
}

fn default_sass() -> ToolCommand {
    ToolCommand::new("sass", &["--no-error-css", "--load-path={source_dir}", "{input}", "{output}"])
        .with_source_map_args(&["--source-map", "--embed-sources"])
}

fn default_babel() -> ToolCommand {
    ToolCommand::new("npx", &["babel", "{input}", "--out-file", "{output}"])
        .with_source_map_args(&["--source-maps"])
}

fn default_terser() -> ToolCommand {
    ToolCommand::new("npx", &["terser", "{input}", "--compress", "--mangle", "--output", "{output}"])
}

fn default_eslint() -> ToolCommand {
    ToolCommand::new(
        "npx",
        &["eslint", "--fix-dry-run", "--format", "json", "--stdin", "--stdin-filename", "{input}"],
    )
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sass: default_sass(),
            babel: default_babel(),
            terser: default_terser(),
            eslint: default_eslint(),
        }
    }
}

/// Development server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Port; `0` picks a free one
    #[serde(default = "default_port")]
    pub port: u16,
    /// Default document for directory requests
    #[serde(default = "default_index")]
    pub index: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_index() -> String {
    "index.html".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), index: default_index() }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Patterns (relative to `project.src`) that re-run `styles`
    #[serde(default = "default_watch_styles")]
    pub styles: Vec<String>,
    /// Patterns (relative to `project.src`) that re-run `scripts`
    #[serde(default = "default_script_sources")]
    pub scripts: Vec<String>,
    /// Patterns (relative to `project.out`) that trigger a browser reload
    #[serde(default = "default_watch_reload")]
    pub reload: Vec<String>,
}

fn default_debounce_ms() -> u32 {
    100
}

fn default_watch_styles() -> Vec<String> {
    vec!["**/*.scss".to_string()]
}

fn default_watch_reload() -> Vec<String> {
    vec!["css/*".to_string(), "js/*".to_string(), "*.html".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            styles: default_watch_styles(),
            scripts: default_script_sources(),
            reload: default_watch_reload(),
        }
    }
}

/// Complete `assetpipe.toml` configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssetConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub icons: IconsConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub lint: LintConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "icons.sizes[1]")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetpipe.toml: '{}' {}", self.field, self.message)
    }
}

impl AssetConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        if !(1..=100).contains(&self.images.jpeg_quality) {
            push("images.jpeg_quality".to_string(), "must be between 1 and 100");
        }
        let [min, max] = self.images.png_quality;
        if min > max || max > 100 {
            push("images.png_quality".to_string(), "must be [min, max] with min <= max <= 100");
        }
        if self.images.sources.is_empty() {
            push("images.sources".to_string(), "must contain at least one glob pattern");
        }
        if self.scripts.sources.is_empty() {
            push("scripts.sources".to_string(), "must contain at least one glob pattern");
        }

        let mut seen = HashSet::new();
        for (i, [w, h]) in self.icons.sizes.iter().enumerate() {
            if *w == 0 || *h == 0 {
                push(format!("icons.sizes[{}]", i), "dimensions must be positive");
            } else if !seen.insert((*w, *h)) {
                push(format!("icons.sizes[{}]", i), "duplicates an earlier size");
            }
        }

        // Parallel tasks must never share an output directory
        let outs = [
            ("images.out", &self.images.out),
            ("icons.out", &self.icons.out),
            ("styles.out", &self.styles.out),
            ("scripts.out", &self.scripts.out),
        ];
        for (i, (field, dir)) in outs.iter().enumerate() {
            if let Some((other, _)) = outs[..i].iter().find(|(_, d)| d == dir) {
                push(field.to_string(), &format!("must differ from {}", other));
            }
        }

        for (browser, version) in self.styles.targets.entries() {
            if parse_browser_version(version).is_none() {
                push(format!("styles.targets.{}", browser), "must look like \"90\" or \"15.4\"");
            }
        }

        if self.server.index.is_empty() {
            push("server.index".to_string(), "must be a non-empty file name");
        }

        for (name, tool) in [
            ("sass", &self.tools.sass),
            ("babel", &self.tools.babel),
            ("terser", &self.tools.terser),
            ("eslint", &self.tools.eslint),
        ] {
            if tool.program.trim().is_empty() {
                push(format!("tools.{}.program", name), "must be a non-empty command");
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
