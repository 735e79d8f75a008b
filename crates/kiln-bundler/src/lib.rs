#![cfg_attr(docsrs, feature(doc_cfg))]

//! # kiln-bundler
//!
//! The kiln asset pipeline: transform dispatch, whole-build plugins,
//! optimization and emission.
//!
//! A build is a staged [`Pipeline`] run over one
//! [`EffectiveConfig`](kiln_config::EffectiveConfig):
//!
//! 1. entries are collected and every discovered asset is routed through the
//!    chain its [`AssetRule`] declares (in parallel across assets);
//! 2. plugins run in phase order over the [`BuildGraph`];
//! 3. modules are split into chunks and linked into scripts;
//! 4. the optimization stage minifies and recompresses (production);
//! 5. outputs are fingerprinted, named and emitted.
//!
//! ```no_run
//! use kiln_bundler::{Pipeline, TransformCache};
//! use kiln_config::{BuildMode, ConfigLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new(".").load_effective(BuildMode::Production)?;
//! let cache = TransformCache::new(&config.cache_dir);
//! let output = Pipeline::new(&config)?.build(&cache)?;
//! for warning in &output.warnings {
//!     eprintln!("{warning}");
//! }
//! # Ok(()) }
//! ```

pub mod asset;
pub mod cache;
pub mod diagnostics;
pub mod graph;
pub mod link;
pub mod naming;
pub mod optimize;
pub mod output;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod resolve;
pub mod runtime;
pub mod sourcemap;
pub mod transform;

pub use asset::{Asset, AssetId, ModuleType};
pub use cache::{CacheStats, TransformCache};
pub use diagnostics::{Diagnostic, DiagnosticOrigin, DiagnosticSeverity};
pub use graph::{BuildGraph, Chunk, ChunkKind, Module, ModuleOutput, OutputFile, OutputKind};
pub use output::{BuildOutput, ModuleRecord, write_output};
pub use pipeline::{CancellationFlag, Pipeline};
pub use plugins::{
    Activation, BuildContext, Plugin, PluginEntry, PluginId, PluginPhase, PluginRegistry,
    assemble,
};
pub use registry::{AssetRule, ChainStep, ResolvedChain, TransformRegistry};
pub use transform::{
    CachePolicy, Content, Payload, StepKind, TransformContext, TransformSet, TransformStep,
    Transformer,
};

/// Fatal build errors.
///
/// Anything that should only be reported without stopping the build is a
/// [`Diagnostic`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded, validated or applied.
    #[error(transparent)]
    Config(#[from] kiln_config::ConfigError),

    /// No asset rule matches and no fallback rule is configured.
    #[error("unhandled asset type: no rule matches '{asset}'")]
    UnhandledAsset { asset: String },

    /// A module reference could not be resolved to a file.
    #[error("cannot resolve '{specifier}' imported from {importer}")]
    Unresolved { specifier: String, importer: String },

    /// A chain step failed.
    #[error("transform step '{step}' failed for {asset}: {message}")]
    Transform {
        step: String,
        asset: String,
        message: String,
    },

    /// A whole-build plugin failed.
    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with context message.
    #[error("{message}")]
    IoError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// File write operation failed.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// The build was aborted through its cancellation flag.
    #[error("build cancelled")]
    Cancelled,
}

/// Result type alias for kiln-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors raised before any asset was processed.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Config(_) => "kiln::config",
            Error::UnhandledAsset { .. } => "kiln::unhandled_asset",
            Error::Unresolved { .. } => "kiln::unresolved",
            Error::Transform { .. } => "kiln::transform",
            Error::Plugin { .. } => "kiln::plugin",
            Error::Io(_) | Error::IoError { .. } => "kiln::io",
            Error::WriteFailure(_) => "kiln::write_failure",
            Error::InvalidOutputPath(_) => "kiln::invalid_output_path",
            Error::Cancelled => "kiln::cancelled",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Config(err) => err
                .hint()
                .map(|hint| Box::new(hint) as Box<dyn std::fmt::Display>),
            Error::UnhandledAsset { asset } => Some(Box::new(format!(
                "Nothing knows how to build '{}'.\nRemove the import, or set unhandled_assets = \"resource\" to emit unknown files verbatim.",
                asset
            ))),
            Error::Unresolved { specifier, .. } => Some(Box::new(format!(
                "Check that '{}' exists and that its extension is listed in resolve_extensions.",
                specifier
            ))),
            Error::Transform { step, .. } if step.starts_with("preprocess-") => Some(Box::new(
                "Make sure the preprocessor command from [preprocessors] is installed and on PATH.",
            )),
            Error::Plugin { plugin, .. } if plugin == "lint-gate" => Some(Box::new(
                "Fix the reported lint errors or set lint.fail_on_error = false.",
            )),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{}' is invalid. Ensure it's within the output directory and doesn't contain '..' components.",
                path
            ))),
            Error::WriteFailure(msg) => Some(Box::new(format!(
                "Failed to write file. Check disk space and permissions.\nError: {}",
                msg
            ))),
            _ => None,
        }
    }
}
