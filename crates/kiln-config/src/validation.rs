//! Schema validation for a loaded [`KilnConfig`].
//!
//! Runs before any asset is touched so malformed values fail the build at
//! configuration time.

use std::path::Path;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

/// Longest fingerprint that still fits inside a blake3 hex digest.
pub const MAX_HASH_LENGTH: usize = 64;

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    fn validate(&self, config: &KilnConfig) -> Result<()>;
}

/// Checks values only, never the filesystem.
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &KilnConfig) -> Result<()> {
        if config.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }
        for (name, path) in &config.entries {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("entries", "entry names cannot be empty"));
            }
            if name.contains(['/', '\\']) {
                return Err(ConfigError::invalid(
                    "entries",
                    format!("entry name '{name}' must not contain path separators"),
                ));
            }
            if path.as_os_str().is_empty() {
                return Err(ConfigError::invalid(
                    "entries",
                    format!("entry '{name}' has an empty path"),
                ));
            }
        }

        if config.hash_length == 0 || config.hash_length > MAX_HASH_LENGTH {
            return Err(ConfigError::invalid(
                "hash_length",
                format!("must be between 1 and {MAX_HASH_LENGTH}, got {}", config.hash_length),
            ));
        }

        if config.asset_inline_limit == 0 {
            return Err(ConfigError::invalid(
                "asset_inline_limit",
                "must be a positive number of bytes",
            ));
        }

        if config.browserslist.iter().all(|q| q.trim().is_empty()) {
            return Err(ConfigError::invalid("browserslist", "at least one query is required"));
        }

        for (key, _) in &config.defines {
            let valid = key
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
            if !valid {
                return Err(ConfigError::invalid(
                    "defines",
                    format!("'{key}' is not a valid identifier"),
                ));
            }
        }

        for (key, target) in &config.resolve_alias {
            if key.trim_end_matches('$').trim().is_empty() || target.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "resolve_alias",
                    format!("alias '{key}' = '{target}' needs a specifier and a target"),
                ));
            }
        }

        for (tool, command) in [
            ("less", &config.preprocessors.less),
            ("sass", &config.preprocessors.sass),
            ("stylus", &config.preprocessors.stylus),
        ] {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    format!("preprocessors.{tool}"),
                    "command must name a program",
                ));
            }
        }

        if config.dev.port == 0 {
            return Err(ConfigError::invalid("dev.port", "port 0 is not a fixed port"));
        }

        Ok(())
    }
}

/// Schema validation plus existence checks for entries.
pub struct FsValidator<'a> {
    root: &'a Path,
}

impl<'a> FsValidator<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }
}

impl ConfigValidator for FsValidator<'_> {
    fn validate(&self, config: &KilnConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        for (name, entry) in &config.entries {
            let path = self.root.join(entry);
            if !path.is_file() {
                return Err(ConfigError::invalid(
                    "entries",
                    format!("entry '{name}' not found at {}", path.display()),
                ));
            }
        }
        Ok(())
    }
}

pub fn validate_schema(config: &KilnConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

pub fn validate_fs(config: &KilnConfig) -> Result<()> {
    FsValidator::new(&config.root).validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate_schema(&KilnConfig::default()).unwrap();
    }

    #[test]
    fn zero_hash_length_is_rejected() {
        let config = KilnConfig {
            hash_length: 0,
            ..KilnConfig::default()
        };
        let err = validate_schema(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "hash_length"));
    }

    #[test]
    fn oversized_hash_length_is_rejected() {
        let config = KilnConfig {
            hash_length: 65,
            ..KilnConfig::default()
        };
        assert!(validate_schema(&config).is_err());
    }

    #[test]
    fn empty_alias_target_is_rejected() {
        let mut config = KilnConfig::default();
        config.resolve_alias.insert("lodash$".into(), " ".into());
        let err = validate_schema(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "resolve_alias"));
    }

    #[test]
    fn zero_inline_limit_is_rejected() {
        let config = KilnConfig {
            asset_inline_limit: 0,
            ..KilnConfig::default()
        };
        assert!(validate_schema(&config).is_err());
    }

    #[test]
    fn empty_entries_are_rejected() {
        let mut config = KilnConfig::default();
        config.entries.clear();
        assert!(matches!(validate_schema(&config), Err(ConfigError::NoEntries)));
    }

    #[test]
    fn define_keys_must_be_identifiers() {
        let mut config = KilnConfig::default();
        config.defines.insert("process.env".into(), "{}".into());
        assert!(validate_schema(&config).is_err());
    }

    #[test]
    fn empty_preprocessor_command_is_rejected() {
        let mut config = KilnConfig::default();
        config.preprocessors.sass.clear();
        let err = validate_schema(&config).unwrap_err();
        assert!(err.to_string().contains("preprocessors.sass"));
    }
}
