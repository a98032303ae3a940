//! Source map bookkeeping around map-aware tools

use super::{Asset, Sidecar, Transform, TransformError};
use std::path::PathBuf;

/// Mark an asset as wanting a source map.
///
/// Tools later in the pipeline append their map arguments when this is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitSourceMap;

impl Transform for InitSourceMap {
    fn name(&self) -> &str {
        "init-source-map"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        asset.source_map_requested = true;
        Ok(asset)
    }
}

/// Emit the asset's source map as `<file>.map` next to it and link it from
/// the asset with a `sourceMappingURL` comment.
///
/// If no tool produced a map, a minimal one naming the original source is
/// written so the map file always exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteSourceMap;

impl WriteSourceMap {
    fn fallback_map(asset: &Asset) -> String {
        let source = asset
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        serde_json::json!({
            "version": 3,
            "file": asset.file_name(),
            "sources": [source],
            "names": [],
            "mappings": "",
        })
        .to_string()
    }
}

impl Transform for WriteSourceMap {
    fn name(&self) -> &str {
        "write-source-map"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        if !asset.source_map_requested {
            return Ok(asset);
        }

        let map = asset.source_map.take().unwrap_or_else(|| Self::fallback_map(&asset));
        let map_name = format!("{}.map", asset.file_name());

        let comment = match asset.extension().as_deref() {
            Some("css") => format!("/*# sourceMappingURL={} */\n", map_name),
            _ => format!("//# sourceMappingURL={}\n", map_name),
        };
        if !asset.contents.is_empty() && !asset.contents.ends_with(b"\n") {
            asset.contents.push(b'\n');
        }
        asset.contents.extend_from_slice(comment.as_bytes());

        let map_path = match asset.path.parent() {
            Some(dir) => dir.join(&map_name),
            None => PathBuf::from(&map_name),
        };
        asset.sidecars.push(Sidecar { path: map_path, contents: map.into_bytes() });
        Ok(asset)
    }
}
