//! # kiln-config
//!
//! Configuration for the kiln asset pipeline.
//!
//! - [`BuildMode`] is chosen once per invocation ([`BuildMode::detect`]).
//! - [`ConfigLoader`] layers `kiln.toml` profiles, `KILN_*` variables and CLI
//!   overrides into a validated [`KilnConfig`].
//! - [`resolve`] turns a mode and a base config into the read-only
//!   [`EffectiveConfig`] a single build runs against.
//!
//! ```no_run
//! use kiln_config::{BuildMode, ConfigLoader};
//!
//! # fn main() -> kiln_config::Result<()> {
//! let mode = BuildMode::detect(None)?;
//! let effective = ConfigLoader::new(".").load_effective(mode)?;
//! assert_eq!(effective.mode, mode);
//! # Ok(())
//! # }
//! ```

mod defaults;

pub mod config;
pub mod dev;
pub mod discovery;
pub mod effective;
pub mod error;
pub mod loading;
pub mod mode;
pub mod validation;

pub use config::{KilnConfig, LintSettings, PreprocessorCommands, UnhandledAssets};
pub use dev::{DevServerConfig, DevSettings};
pub use discovery::{CONFIG_FILE, ConfigDiscovery};
pub use effective::{EffectiveConfig, FilenameTemplates, SourceMapStrategy, StyleStrategy, resolve};
pub use error::{ConfigError, Result};
pub use loading::{ConfigLoader, ConfigOverrides, DevOverrides};
pub use mode::BuildMode;
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema};
