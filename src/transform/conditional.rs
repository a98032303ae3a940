//! Mode-dependent pipeline steps

use super::{Asset, Transform, TransformError};

/// Apply the wrapped transform only when `enabled`; otherwise pass the asset
/// through unchanged.
///
/// The condition is fixed when the pipeline is built, so a pipeline behaves the
/// same for every file it processes.
pub struct When {
    enabled: bool,
    inner: Box<dyn Transform>,
}

impl When {
    /// Wrap `inner` behind `enabled`.
    pub fn new(enabled: bool, inner: impl Transform + 'static) -> Self {
        Self { enabled, inner: Box::new(inner) }
    }

    /// Whether the wrapped transform runs.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Transform for When {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        if self.enabled {
            self.inner.apply(asset)
        } else {
            Ok(asset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Rename;
    use std::path::PathBuf;

    #[test]
    fn test_when_enabled_applies() {
        let step = When::new(true, Rename::suffix(".min"));
        assert!(step.is_enabled());
        assert_eq!(step.name(), "rename");

        let out = step.apply(Asset::new("a.css", "a.css", vec![])).unwrap();
        assert_eq!(out.path, PathBuf::from("a.min.css"));
    }

    #[test]
    fn test_when_disabled_is_identity() {
        let step = When::new(false, Rename::suffix(".min"));
        let out = step.apply(Asset::new("a.css", "a.css", b"x".to_vec())).unwrap();
        assert_eq!(out.path, PathBuf::from("a.css"));
        assert_eq!(out.contents, b"x");
    }
}
