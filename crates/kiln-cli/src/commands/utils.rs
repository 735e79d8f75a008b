//! Shared utilities for command implementations.
//!
//! - Project root discovery
//! - Build mode selection
//! - Configuration loading with CLI overrides

use std::path::{Path, PathBuf};

use kiln_config::{
    BuildMode, ConfigDiscovery, ConfigLoader, ConfigOverrides, EffectiveConfig, resolve,
    validate_fs,
};

use crate::cli::ProjectArgs;
use crate::error::{CliError, Result};

/// Resolve a path relative to a working directory.
///
/// If the path is absolute, returns it unchanged.
pub fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Get the current working directory.
pub fn get_cwd() -> Result<PathBuf> {
    std::env::current_dir().map_err(CliError::Io)
}

/// The project root for `args`.
///
/// An explicit `--root` must exist and is used as is. Otherwise the nearest
/// directory at or above the working directory holding a `kiln.toml` wins,
/// falling back to the working directory itself.
pub fn project_root(args: &ProjectArgs) -> Result<PathBuf> {
    let cwd = get_cwd()?;
    match &args.root {
        Some(root) => {
            let root = resolve_path(root, &cwd);
            if !root.is_dir() {
                return Err(CliError::FileNotFound(root));
            }
            Ok(root)
        }
        None => Ok(ConfigDiscovery::new(&cwd).project_root()),
    }
}

/// Select the build mode: `--mode`, then `KILN_MODE`, then `NODE_ENV`.
///
/// `default` applies only when none of them is set.
pub fn select_mode(args: &ProjectArgs, default: BuildMode) -> Result<BuildMode> {
    let env_set = [kiln_config::mode::MODE_ENV, kiln_config::mode::NODE_ENV]
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()));
    if args.mode.is_none() && !env_set {
        return Ok(default);
    }
    Ok(BuildMode::detect(args.mode.as_deref())?)
}

/// Load, validate and resolve the configuration a command runs against.
///
/// Entries are checked against the filesystem so a missing entry fails
/// here, before the pipeline starts.
pub fn load_config(
    args: &ProjectArgs,
    mode: BuildMode,
    overrides: ConfigOverrides,
) -> Result<EffectiveConfig> {
    let root = project_root(args)?;
    let mut loader = ConfigLoader::new(&root).with_overrides(overrides);
    if let Some(file) = &args.config {
        loader = loader.with_file(resolve_path(file, &get_cwd()?));
    }

    let base = loader.load(mode)?;
    validate_fs(&base)?;
    let effective = resolve(mode, &base);

    tracing::debug!(
        mode = %effective.mode,
        root = %effective.root.display(),
        entries = effective.entries.len(),
        "configuration resolved"
    );
    Ok(effective)
}

/// Project-relative display form of `path`.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
