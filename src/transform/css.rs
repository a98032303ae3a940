//! CSS transforms backed by lightningcss: vendor prefixing and minification

use super::{Asset, Transform, TransformError};
use crate::config::{parse_browser_version, BrowserTargets};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

/// Convert configured browser versions into lightningcss targets.
///
/// Unparseable versions are skipped; config validation reports them.
pub fn browsers_from(targets: &BrowserTargets) -> Browsers {
    let mut browsers = Browsers::default();
    for (name, version) in targets.entries() {
        let Some(v) = parse_browser_version(version) else {
            continue;
        };
        match name {
            "chrome" => browsers.chrome = Some(v),
            "edge" => browsers.edge = Some(v),
            "firefox" => browsers.firefox = Some(v),
            "safari" => browsers.safari = Some(v),
            "ios_saf" => browsers.ios_saf = Some(v),
            "android" => browsers.android = Some(v),
            "samsung" => browsers.samsung = Some(v),
            "opera" => browsers.opera = Some(v),
            "ie" => browsers.ie = Some(v),
            _ => {}
        }
    }
    browsers
}

/// Printed stylesheet plus its source map, when one was asked for.
struct Printed {
    code: String,
    map: Option<String>,
}

/// Parse, lower for `targets`, and print a stylesheet.
///
/// With `input_map`, the printed stylesheet gets a map whose mappings are
/// traced back through `input_map` to the original sources.
fn process(
    css: &str,
    filename: &str,
    targets: Targets,
    minify: bool,
    input_map: Option<&str>,
) -> Result<Printed, String> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions { filename: filename.to_string(), ..ParserOptions::default() },
    )
    .map_err(|e| e.to_string())?;

    sheet
        .minify(MinifyOptions { targets, ..MinifyOptions::default() })
        .map_err(|e| e.to_string())?;

    let Some(input_map) = input_map else {
        let out = sheet
            .to_css(PrinterOptions { minify, targets, ..PrinterOptions::default() })
            .map_err(|e| e.to_string())?;
        return Ok(Printed { code: out.code, map: None });
    };

    let mut original = read_map(input_map)?;
    let mut map = SourceMap::new("/");
    let index = map.add_source(filename);
    map.set_source_content(index as usize, css).map_err(|e| e.to_string())?;

    let out = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            source_map: Some(&mut map),
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;

    map.extends(&mut original).map_err(|e| e.to_string())?;
    let json = map.to_json(None).map_err(|e| e.to_string())?;
    Ok(Printed { code: out.code, map: Some(json) })
}

/// Parse a v3 source map, accepting maps that leave out `names`.
fn read_map(json: &str) -> Result<SourceMap, String> {
    let unreadable = |e: &dyn std::fmt::Display| format!("unreadable input source map: {}", e);
    let mut value: serde_json::Value = serde_json::from_str(json).map_err(|e| unreadable(&e))?;
    if let Some(fields) = value.as_object_mut() {
        fields.entry("names").or_insert_with(|| serde_json::Value::Array(Vec::new()));
    }
    SourceMap::from_json("/", &value.to_string()).map_err(|e| unreadable(&e))
}

/// Add vendor prefixes required by the configured browsers.
///
/// Output stays readable (not minified). A source map already on the asset
/// is replaced by one describing the prefixed output, still pointing at the
/// original sources.
#[derive(Debug, Clone)]
pub struct PrefixCss {
    targets: Targets,
}

impl PrefixCss {
    /// Create a prefixer for the given browsers.
    pub fn new(targets: &BrowserTargets) -> Self {
        Self { targets: Targets::from(browsers_from(targets)) }
    }
}

impl Transform for PrefixCss {
    fn name(&self) -> &str {
        "prefix-css"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let filename = asset.file_name();
        let printed = process(
            asset.text(self.name())?,
            &filename,
            self.targets,
            false,
            asset.source_map.as_deref(),
        )
        .map_err(|e| TransformError::rejected(self.name(), e))?;
        asset.contents = printed.code.into_bytes();
        asset.source_map = printed.map;
        Ok(asset)
    }
}

/// Minify a stylesheet.
#[derive(Debug, Clone)]
pub struct MinifyCss {
    targets: Targets,
}

impl MinifyCss {
    /// Create a minifier that keeps output valid for the given browsers.
    pub fn new(targets: &BrowserTargets) -> Self {
        Self { targets: Targets::from(browsers_from(targets)) }
    }
}

impl Transform for MinifyCss {
    fn name(&self) -> &str {
        "minify-css"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let filename = asset.file_name();
        let printed = process(asset.text(self.name())?, &filename, self.targets, true, None)
            .map_err(|e| TransformError::rejected(self.name(), e))?;
        asset.contents = printed.code.into_bytes();
        // Positions no longer match anything a map could describe
        asset.source_map = None;
        Ok(asset)
    }
}
