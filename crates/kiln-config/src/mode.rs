//! Build mode selection.
//!
//! A build runs in exactly one [`BuildMode`]. The mode is chosen once per
//! invocation from the `--mode` flag, then `KILN_MODE`, then `NODE_ENV`, and
//! never changes mid-build. Unrecognised values are rejected rather than
//! silently mapped to development.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Environment variable consulted before `NODE_ENV`.
pub const MODE_ENV: &str = "KILN_MODE";

/// Conventional environment variable shared with the wider JS tooling.
pub const NODE_ENV: &str = "NODE_ENV";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    pub const ALL: [BuildMode; 2] = [BuildMode::Development, BuildMode::Production];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, BuildMode::Production)
    }

    /// Pick a mode from the explicit flag and the two environment variables.
    ///
    /// The first source that is present (and non-empty) decides; absence of
    /// all three means development.
    pub fn from_sources(
        flag: Option<&str>,
        kiln_mode: Option<&str>,
        node_env: Option<&str>,
    ) -> Result<Self> {
        [flag, kiln_mode, node_env]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map_or(Ok(BuildMode::Development), |value| value.parse())
    }

    /// Same as [`BuildMode::from_sources`] with the variables read from the
    /// process environment.
    pub fn detect(flag: Option<&str>) -> Result<Self> {
        let kiln_mode = std::env::var(MODE_ENV).ok();
        let node_env = std::env::var(NODE_ENV).ok();
        let mode = Self::from_sources(flag, kiln_mode.as_deref(), node_env.as_deref())?;
        tracing::debug!(mode = %mode, "build mode selected");
        Ok(mode)
    }
}

impl FromStr for BuildMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(BuildMode::Development),
            "production" => Ok(BuildMode::Production),
            _ => Err(ConfigError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
