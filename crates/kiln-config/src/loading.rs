//! Layered configuration loading.
//!
//! Priority, lowest first: the `[default]` table of `kiln.toml`, the table
//! named after the build mode, `KILN_*` environment variables, then CLI
//! overrides. Nested keys in the environment use a double underscore
//! (`KILN_DEV__PORT=4000`). Serde defaults fill anything left unset.
//!
//! Tables merge key by key, so an `entries` table in the file is combined
//! with nothing but other layers' `entries`; built-in defaults never leak
//! into a map the user wrote.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::Serialize;

use crate::config::KilnConfig;
use crate::discovery::CONFIG_FILE;
use crate::effective::{EffectiveConfig, resolve};
use crate::error::{ConfigError, Result};
use crate::mode::BuildMode;
use crate::validation::validate_schema;

/// Values supplied on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "DevOverrides::is_empty")]
    pub dev: DevOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
}

impl DevOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.open.is_none()
    }
}

/// Builder over the layered sources for one project root.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
    file: Option<PathBuf>,
    overrides: ConfigOverrides,
    use_env: bool,
}

impl ConfigLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            file: None,
            overrides: ConfigOverrides::default(),
            use_env: true,
        }
    }

    /// Load from an explicit file instead of `<root>/kiln.toml`. The file
    /// must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Skip the `KILN_*` environment layer.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    fn figment(&self, mode: BuildMode) -> Result<Figment> {
        let mut figment = Figment::new();

        match &self.file {
            Some(path) if !path.is_file() => return Err(ConfigError::NotFound(path.clone())),
            Some(path) => figment = figment.merge(Toml::file(path).nested()),
            None => {
                let path = self.root.join(CONFIG_FILE);
                if path.is_file() {
                    figment = figment.merge(Toml::file(path).nested());
                } else {
                    tracing::debug!(root = %self.root.display(), "no kiln.toml, using defaults");
                }
            }
        }

        if self.use_env {
            // Global so values beat the mode table of the file.
            figment = figment.merge(
                Env::prefixed("KILN_")
                    .ignore(&["MODE"])
                    .split("__")
                    .global(),
            );
        }

        figment = figment.merge(Serialized::globals(&self.overrides));
        Ok(figment.select(mode.as_str()))
    }

    /// Load and validate the base configuration for `mode`.
    pub fn load(&self, mode: BuildMode) -> Result<KilnConfig> {
        let mut config: KilnConfig = self.figment(mode)?.extract()?;
        if config.root.is_relative() {
            config.root = self.root.join(&config.root);
        }
        validate_schema(&config)?;
        tracing::debug!(mode = %mode, root = %config.root.display(), "configuration loaded");
        Ok(config)
    }

    /// Load, validate and resolve in one step.
    pub fn load_effective(&self, mode: BuildMode) -> Result<EffectiveConfig> {
        let config = self.load(mode)?;
        Ok(resolve(mode, &config))
    }
}
