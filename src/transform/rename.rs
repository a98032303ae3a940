//! Output path renaming

use super::{Asset, Transform, TransformError};

/// Change an asset's output file name.
#[derive(Debug, Clone)]
pub enum Rename {
    /// Insert a suffix before the extension: `app.js` becomes `app.min.js`
    Suffix(String),
    /// Replace the file name, keeping the directory
    To(String),
}

impl Rename {
    /// Rename by inserting `suffix` before the extension.
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Rename::Suffix(suffix.into())
    }

    /// Rename to a fixed file name.
    pub fn to(name: impl Into<String>) -> Self {
        Rename::To(name.into())
    }

    fn new_name(&self, asset: &Asset) -> String {
        match self {
            Rename::To(name) => name.clone(),
            Rename::Suffix(suffix) => {
                let stem = asset
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match asset.path.extension() {
                    Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
                    None => format!("{}{}", stem, suffix),
                }
            }
        }
    }
}

impl Transform for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let name = self.new_name(&asset);
        asset.path = asset.path.with_file_name(name);
        Ok(asset)
    }
}
