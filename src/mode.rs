//! Build mode selection (development vs. production)
//!
//! The mode is resolved once at startup and then passed by value into every
//! task constructor. Nothing reads the environment after that.

use serde::{Deserialize, Serialize};

/// Environment variable consulted by [`Mode::from_env`]
pub const MODE_ENV_VAR: &str = "NODE_ENV";

/// Build mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Source maps, no minification
    #[default]
    Development,
    /// Minified, `.min`-suffixed output, no source maps
    Production,
}

impl Mode {
    /// Read the mode from `NODE_ENV`.
    ///
    /// Only the exact value `production` selects [`Mode::Production`].
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    /// Map a raw environment value to a mode.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("production") => Mode::Production,
            _ => Mode::Development,
        }
    }

    /// Whether this is a production build.
    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}
