//! Error types for configuration loading, validation and mode selection.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognised build mode '{value}' (expected 'development' or 'production')")]
    InvalidMode { value: String },

    #[error("config not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load configuration: {0}")]
    Load(Box<figment::Error>),

    #[error("invalid config value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("no entries specified")]
    NoEntries,

    #[error("invalid asset rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short remediation hint shown under the error by the CLI.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ConfigError::InvalidMode { .. } => {
                Some("pass --mode development|production or fix KILN_MODE / NODE_ENV")
            }
            ConfigError::NotFound(_) => Some("create a kiln.toml or run from the project root"),
            ConfigError::Load(_) => Some("check kiln.toml syntax and KILN_* environment variables"),
            ConfigError::NoEntries => Some("add at least one entry under [default.entries]"),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
